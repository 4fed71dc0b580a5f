use std::num::IntErrorKind;

use http::{Extensions, Request};
use uuid::Uuid;

use crate::http_injector::HttpHeaderProvider;

/// Header carrying the end-to-end correlation id.
pub const TRACE_ID_HEADER: &str = "x-trace-id";
/// Header carrying the decimal hop counter.
pub const SPAN_ID_HEADER: &str = "x-span-id";

/// Identifier pair attached to a single request.
///
/// A `TraceContext` is created once by the middleware and is read-only
/// afterwards. It is stored in the request extensions keyed by its own type,
/// so the only way to attach or look it up is through this type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TraceContext {
    trace_id: String,
    span_id: String,
}

impl TraceContext {
    /// Derives the context for an inbound request.
    ///
    /// The trace id is taken verbatim from [`TRACE_ID_HEADER`] when present,
    /// non-empty and visible ASCII, otherwise a new v4 UUID is generated.
    /// Values carrying opaque bytes (0x80-0xFF) count as absent. The span id
    /// is the inbound [`SPAN_ID_HEADER`] plus one, saturating at `u64::MAX`.
    /// A missing or unparseable value counts as zero; a decimal value too
    /// large for `u64` counts as `u64::MAX`.
    ///
    /// Passing `None` yields the same result as [`TraceContext::root`].
    pub fn from_headers<H>(headers: Option<&H>) -> Self
    where
        H: HttpHeaderProvider + ?Sized,
    {
        Self {
            trace_id: resolve_trace_id(headers),
            span_id: resolve_span_id(headers),
        }
    }

    /// Fresh context for callers without a live request, e.g. background
    /// tasks. The span id is always `"0"`.
    pub fn root() -> Self {
        Self::from_headers::<http::HeaderMap>(None)
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }
}

/// Anything a [`TraceContext`] can be attached to and read back from.
pub trait TraceContextSource {
    /// Returns the attached context, if any.
    fn trace_context(&self) -> Option<TraceContext>;
}

impl TraceContextSource for Extensions {
    fn trace_context(&self) -> Option<TraceContext> {
        self.get::<TraceContext>().cloned()
    }
}

impl<T> TraceContextSource for Request<T> {
    fn trace_context(&self) -> Option<TraceContext> {
        self.extensions().trace_context()
    }
}

/// Returns the [`TraceContext`] attached to `request`.
///
/// Never fails: if there is no request, or the request never passed through
/// the middleware, a fresh root context is synthesized instead.
pub fn get_trace_context<R>(request: Option<&R>) -> TraceContext
where
    R: TraceContextSource + ?Sized,
{
    request
        .and_then(TraceContextSource::trace_context)
        .unwrap_or_else(TraceContext::root)
}

fn resolve_trace_id<H>(headers: Option<&H>) -> String
where
    H: HttpHeaderProvider + ?Sized,
{
    headers
        .and_then(|headers| headers.get(TRACE_ID_HEADER))
        .filter(|trace_id| !trace_id.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(new_trace_id)
}

// `Uuid::new_v4` cannot fail, so the empty trace id fallback for a broken
// random source never happens here.
fn new_trace_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

fn resolve_span_id<H>(headers: Option<&H>) -> String
where
    H: HttpHeaderProvider + ?Sized,
{
    let Some(headers) = headers else {
        return "0".to_string();
    };

    let parent = match headers.get(SPAN_ID_HEADER) {
        Some(value) => match value.parse::<u64>() {
            Ok(parent) => parent,
            Err(err) if *err.kind() == IntErrorKind::PosOverflow => u64::MAX,
            Err(err) => {
                tracing::debug!(%value, %err, "failed to parse span id, starting from zero");
                0
            }
        },
        None => 0,
    };

    parent.saturating_add(1).to_string()
}
