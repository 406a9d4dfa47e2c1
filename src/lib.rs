//! Request-tracing middleware for server applications.
//!
//! `reqtrace` wraps an inbound request in a root span, continues a
//! distributed trace from the incoming propagation headers, and guarantees
//! that the captured span tree is exported exactly once per request,
//! however the handler exits.
//!
//! # Getting started
//!
//! ```
//! use reqtrace::middleware::{HandlerResult, RequestEnv, RequestTracingMiddleware, Response};
//! use reqtrace::trace::{InMemorySpanExporter, Span, StatusCode};
//!
//! let exporter = InMemorySpanExporter::default();
//! let middleware = RequestTracingMiddleware::builder(
//!     |_env: &mut RequestEnv, span: &mut Span| -> HandlerResult {
//!         // Long-running operations can be captured as custom sub-spans.
//!         span.in_span("long task", |_span| {});
//!         Ok(Response::new(200).with_body(vec![b"Hello world!".to_vec()]))
//!     })
//!     .with_exporter(exporter.clone())
//!     .build();
//!
//! let mut env = RequestEnv::get("/");
//! let response = middleware.call(&mut env).unwrap();
//! assert_eq!(response.status, 200);
//!
//! let trees = exporter.get_finished_trees().unwrap();
//! assert_eq!(trees.len(), 1);
//! let root = trees[0].root().unwrap();
//! assert_eq!(root.status.as_ref().unwrap().code, StatusCode::Ok);
//! ```
//!
//! Incoming `traceparent` (W3C Trace Context) and `X-Cloud-Trace-Context`
//! headers are autodetected; the first registered formatter whose header is
//! present wins, and a malformed value simply starts a new trace root.

#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unused
)]

pub mod config;
pub mod error;
pub mod middleware;
pub mod propagation;
pub mod trace;
mod trace_context;

pub use config::{default_config, set_default_config, SpanCallback, TracingConfig};
pub use error::TraceError;
pub use middleware::{
    Handler, HandlerError, HandlerResult, RequestEnv, RequestTracingMiddleware, Response,
};
pub use trace_context::{PropagationContext, SpanId, TraceFlags, TraceId};
