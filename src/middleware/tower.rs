use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::{Request, Response};
use tower::Service;
use tower_layer::Layer;
use tracing::Instrument;

use crate::{http_injector, trace_context::TraceContext};

/// Tags every request with a [`TraceContext`].
///
/// The context is derived from the inbound `X-Trace-Id` / `X-Span-Id`
/// headers, inserted into the request extensions for handlers to read via
/// [`crate::get_trace_context`], and echoed on the response headers.
///
/// Generally, the middleware should be used on every http route, this usually
/// means that it can be registered globally and in the last position, to be the
/// first to run, even before general logging layers.
///
/// The `TraceLayer` will not log http requests. For that, another solution
/// needs to be added additionally.
///
/// ```ignore
/// let app = Router::new()
///     .route("/foo", get(|| async {}))
///     .route("/bar", get(|| async {}))
///     .layer(TraceLayer);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceLayer;

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, service: S) -> Self::Service {
        TraceService { service }
    }
}

/// This service implements the Trace behavior
#[derive(Clone, Debug)]
pub struct TraceService<S> {
    service: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TraceService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: 'static,
    ResBody: 'static,
{
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = Response<ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let context = TraceContext::from_headers(Some(&request));
        let span = http_injector::request_span(&context);
        request.extensions_mut().insert(context.clone());

        let future = self.service.call(request);
        Box::pin(
            async move {
                let mut response = future.await?;
                http_injector::inject_trace_context_into_response(&context, &mut response);
                Ok(response)
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use tower::{service_fn, ServiceExt};

    use super::*;
    use crate::{
        get_trace_context,
        trace_context::{SPAN_ID_HEADER, TRACE_ID_HEADER},
    };

    /// Responds with the context the handler observed.
    async fn observe(request: Request<()>) -> Result<Response<TraceContext>, Infallible> {
        let first = get_trace_context(Some(&request));
        let second = get_trace_context(Some(&request));
        assert_eq!(first, second);
        Ok(Response::new(first))
    }

    async fn send(request: Request<()>) -> Response<TraceContext> {
        TraceLayer
            .layer(service_fn(observe))
            .oneshot(request)
            .await
            .unwrap()
    }

    fn header<'r>(response: &'r Response<TraceContext>, key: &str) -> &'r str {
        response.headers()[key].to_str().unwrap()
    }

    #[tokio::test]
    async fn propagates_inbound_identifiers() {
        let request = Request::builder()
            .header("X-Trace-Id", "t1")
            .header("X-Span-Id", "2")
            .body(())
            .unwrap();

        let response = send(request).await;

        assert_eq!(header(&response, TRACE_ID_HEADER), "t1");
        assert_eq!(header(&response, SPAN_ID_HEADER), "3");
        assert_eq!(response.headers().len(), 2);
        assert_eq!(response.body().trace_id(), "t1");
        assert_eq!(response.body().span_id(), "3");
    }

    #[tokio::test]
    async fn generates_trace_id_visible_to_handler() {
        let response = send(Request::new(())).await;

        let trace_id = header(&response, TRACE_ID_HEADER);
        let uuid = uuid::Uuid::parse_str(trace_id).unwrap();
        assert_eq!(uuid.get_version_num(), 4);
        assert_eq!(header(&response, SPAN_ID_HEADER), "1");
        assert_eq!(response.body().trace_id(), trace_id);
        assert_eq!(response.body().span_id(), "1");
    }

    #[tokio::test]
    async fn non_numeric_span_id_restarts_at_one() {
        let request = Request::builder()
            .header(TRACE_ID_HEADER, "abc-123")
            .header(SPAN_ID_HEADER, "xyz")
            .body(())
            .unwrap();

        let response = send(request).await;

        assert_eq!(header(&response, TRACE_ID_HEADER), "abc-123");
        assert_eq!(header(&response, SPAN_ID_HEADER), "1");
    }

    #[tokio::test]
    async fn handler_headers_are_replaced() {
        let service = TraceLayer.layer(service_fn(|_request: Request<()>| async {
            let response = Response::builder()
                .header(TRACE_ID_HEADER, "handler")
                .body(())
                .unwrap();
            Ok::<_, Infallible>(response)
        }));
        let request = Request::builder()
            .header(TRACE_ID_HEADER, "t1")
            .body(())
            .unwrap();

        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.headers()[TRACE_ID_HEADER], "t1");
        assert_eq!(response.headers().get_all(TRACE_ID_HEADER).iter().count(), 1);
    }

    #[tokio::test]
    async fn layers_chain() {
        let service = TraceLayer.layer(TraceLayer.layer(service_fn(observe)));
        let request = Request::builder()
            .header(TRACE_ID_HEADER, "t1")
            .header(SPAN_ID_HEADER, "4")
            .body(())
            .unwrap();

        let response = service.oneshot(request).await.unwrap();

        // the inner layer reads the same inbound request headers
        assert_eq!(header(&response, SPAN_ID_HEADER), "5");
        assert_eq!(response.body().span_id(), "5");
    }
}
