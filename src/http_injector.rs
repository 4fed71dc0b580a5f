use http::{HeaderMap, HeaderName, HeaderValue, Request, Response};
use tracing::Span;

use crate::trace_context::{TraceContext, SPAN_ID_HEADER, TRACE_ID_HEADER};

/// Read access to the headers of an http request, independent of the
/// framework that owns it.
pub trait HttpHeaderProvider {
    /// Returns the header value for `key`, or `None` if it is missing or not
    /// visible ASCII.
    fn get(&self, key: &str) -> Option<&str>;
}

impl HttpHeaderProvider for HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        HeaderMap::get(self, key).and_then(|h| h.to_str().ok())
    }
}

impl<T> HttpHeaderProvider for Request<T> {
    fn get(&self, key: &str) -> Option<&str> {
        HttpHeaderProvider::get(self.headers(), key)
    }
}

/// Writes the [`TraceContext`] into outgoing [`Request`] headers so the next
/// hop continues the same trace.
///
/// The receiving service increments the span id itself, so the values are
/// written unchanged.
pub fn inject_trace_context_into_request<'r, T>(
    context: &TraceContext,
    request: &'r mut Request<T>,
) -> &'r mut Request<T> {
    inject_trace_context_into_headers(context, request.headers_mut());

    request
}

/// Echoes the [`TraceContext`] on a [`Response`], replacing any values the
/// inner handler may have set.
pub fn inject_trace_context_into_response<'r, T>(
    context: &TraceContext,
    response: &'r mut Response<T>,
) -> &'r mut Response<T> {
    inject_trace_context_into_headers(context, response.headers_mut());

    response
}

pub fn inject_trace_context_into_headers(context: &TraceContext, headers: &mut HeaderMap) {
    let mut injector = HeaderInjector { headers };
    injector.set(TRACE_ID_HEADER, context.trace_id());
    injector.set(SPAN_ID_HEADER, context.span_id());
}

/// Span the middleware runs the inner service in, so that events emitted by
/// handlers carry both identifiers.
pub fn request_span(context: &TraceContext) -> Span {
    tracing::info_span!(
        "request",
        trace_id = %context.trace_id(),
        span_id = %context.span_id(),
    )
}

struct HeaderInjector<'a> {
    headers: &'a mut HeaderMap,
}

impl HeaderInjector<'_> {
    fn set(&mut self, key: &'static str, value: &str) {
        let Ok(value) = HeaderValue::from_str(value) else {
            tracing::debug!(%key, %value, "failed to parse header value");
            return;
        };
        self.headers.insert(HeaderName::from_static(key), value);
    }
}
