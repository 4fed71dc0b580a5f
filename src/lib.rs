//! # Request tagging
//! This crate tags every inbound http request with a trace id and a span id,
//! echoes both on the response and makes them available to route handlers.
//!
//! ## Identifiers
//! [`TraceContext`] holds the pair. The trace id is inherited from the
//! `X-Trace-Id` request header or freshly generated as a v4 UUID. The span id
//! is the inbound `X-Span-Id` plus one, where a missing or malformed value
//! counts as zero. None of this ever rejects a request.
//!
//! ## Middleware
//! When using [`tower`] based http frameworks like [`axum`](https://docs.rs/axum/latest/axum), the middleware `middleware::tower::TraceLayer`
//! (feature `tower`) does the tagging. `middleware::actix::TraceLayer`
//! (feature `actix`) does the same for actix-web.
//!
//! Generally, the middleware should be used on every http route, this usually
//! means that it can be registered globally and in the last position, to be the
//! first to run.
//!
//! ## Features
//! Both integrations are off by default. Their tests only build with the
//! matching feature enabled, so run the full suite with
//! `cargo test --all-features`.
//!
//! ## Reading the context
//! Handlers call [`get_trace_context`] with their request. It always returns a
//! usable context, falling back to a fresh root context when the request was
//! not tagged. [`http_injector`] writes a context into outgoing requests to
//! continue the trace downstream.
//!
//! ## Setup
//! Logging can be set up using [`setup::setup`].

pub mod http_injector;
pub mod middleware;
pub mod setup;
pub mod trace_context;

pub use trace_context::{
    get_trace_context, TraceContext, TraceContextSource, SPAN_ID_HEADER, TRACE_ID_HEADER,
};
