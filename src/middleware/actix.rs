use std::{future, future::Ready};

use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, HeaderName, HeaderValue},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use tracing::Instrument;

use crate::{
    get_trace_context, http_injector,
    http_injector::HttpHeaderProvider,
    trace_context::{TraceContext, TraceContextSource, SPAN_ID_HEADER, TRACE_ID_HEADER},
};

/// Tags every request with a [`TraceContext`].
///
/// Generally, the middleware should be used on every http route, this usually
/// means that it can be registered globally and in the last position, to be the
/// first to run, even before general logging layers.
///
/// The `TraceLayer` will not log http requests. For that, another solution
/// needs to be added additionally.
///
/// ```ignore
/// let app = App::new()
///     .route("/foo", web::get().to(|trace: TraceContext| async move { trace.trace_id().to_owned() }))
///     .wrap(TraceLayer);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceLayer;

impl<S, B> Transform<S, ServiceRequest> for TraceLayer
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<EitherBody<B>>;
    type Transform = TraceService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        future::ready(Ok(TraceService { service }))
    }
}

/// This service implements the Trace behavior
pub struct TraceService<S> {
    service: S,
}

impl<S, Body> Service<ServiceRequest> for TraceService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<Body>, Error = Error>,
    S::Future: 'static,
    Body: MessageBody + 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<EitherBody<Body>>;

    // This service is ready when its next service is ready
    forward_ready!(service);

    fn call(&self, request: ServiceRequest) -> Self::Future {
        let context = TraceContext::from_headers(Some(request.request()));
        let span = http_injector::request_span(&context);
        request.extensions_mut().insert(context.clone());
        // inner errors are rendered here so they still carry the headers
        let http_request = request.request().clone();

        let future = self.service.call(request);
        Box::pin(
            async move {
                let mut response = match future.await {
                    Ok(response) => response.map_into_left_body(),
                    Err(err) => {
                        ServiceResponse::from_err(err, http_request).map_into_right_body()
                    }
                };
                inject_trace_context(&context, response.headers_mut());
                Ok(response)
            }
            .instrument(span),
        )
    }
}

// actix carries its own header map, so this mirrors
// `http_injector::inject_trace_context_into_headers`.
fn inject_trace_context(context: &TraceContext, headers: &mut HeaderMap) {
    for (key, value) in [
        (TRACE_ID_HEADER, context.trace_id()),
        (SPAN_ID_HEADER, context.span_id()),
    ] {
        let Ok(value) = HeaderValue::from_str(value) else {
            tracing::debug!(%key, %value, "failed to parse header value");
            continue;
        };
        headers.insert(HeaderName::from_static(key), value);
    }
}

impl HttpHeaderProvider for HttpRequest {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers().get(key).and_then(|x| x.to_str().ok())
    }
}

impl TraceContextSource for HttpRequest {
    fn trace_context(&self) -> Option<TraceContext> {
        self.extensions().get::<TraceContext>().cloned()
    }
}

impl TraceContextSource for ServiceRequest {
    fn trace_context(&self) -> Option<TraceContext> {
        self.extensions().get::<TraceContext>().cloned()
    }
}

/// Handlers can take a [`TraceContext`] argument directly. Extraction never
/// fails; without the middleware a fresh root context is returned.
impl FromRequest for TraceContext {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(request: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        future::ready(Ok(get_trace_context(Some(request))))
    }
}
