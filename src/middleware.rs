//! Request-tracing middleware.
//!
//! Wraps an inbound server request in a root span and exports the captured
//! span tree at the end of the request:
//!
//! * the parent trace context is detected from the incoming propagation
//!   headers (first registered formatter wins),
//! * a root span named after the normalized request path records the
//!   request metadata and the mapped response status,
//! * the finished span tree is handed to the exporter exactly once per
//!   request, on every exit path, including handler failure and panic.
//!
//! ```
//! use reqtrace::middleware::{HandlerResult, RequestEnv, RequestTracingMiddleware, Response};
//! use reqtrace::trace::{InMemorySpanExporter, Span};
//!
//! let exporter = InMemorySpanExporter::default();
//! let middleware = RequestTracingMiddleware::builder(
//!     |_env: &mut RequestEnv, _span: &mut Span| -> HandlerResult {
//!         Ok(Response::new(200))
//!     })
//!     .with_exporter(exporter.clone())
//!     .build();
//!
//! let mut env = RequestEnv::get("/");
//! let response = middleware.call(&mut env).unwrap();
//! assert_eq!(response.status, 200);
//! assert_eq!(exporter.get_finished_trees().unwrap().len(), 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{self, SpanCallback};
use crate::propagation::{self, HeaderFormatter};
use crate::trace::{RequestTrace, Span, SpanExporter, SpanKind, Status, StatusCode, Tracer};

/// Opaque error surfaced by a request handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of one handled request.
pub type HandlerResult = Result<Response, HandlerError>;

/// The downstream request handler wrapped by the middleware.
///
/// The handler runs inside the request span and receives a handle on it,
/// through which it may record attributes or open named sub-spans for
/// long-running operations.
pub trait Handler: Send + Sync {
    /// Handle one request.
    fn call(&self, env: &mut RequestEnv, span: &mut Span) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&mut RequestEnv, &mut Span) -> HandlerResult + Send + Sync,
{
    fn call(&self, env: &mut RequestEnv, span: &mut Span) -> HandlerResult {
        self(env, span)
    }
}

/// The environment of one inbound request.
///
/// Header names are lowercase. The extensions map is free-form string
/// storage for passing data between the handler and the configured
/// callbacks.
#[derive(Clone, Debug, Default)]
pub struct RequestEnv {
    /// The HTTP request method.
    pub method: String,
    /// Mount-point prefix of the logical path, may be empty.
    pub script_name: String,
    /// Remainder of the logical path.
    pub path_info: String,
    /// The raw query string, without the leading `?`.
    pub query_string: String,
    /// The URL scheme, e.g. `http`.
    pub scheme: String,
    /// The server's own name, used when no `host` header is present.
    pub server_name: String,
    /// The client protocol, e.g. `HTTP/1.1`.
    pub server_protocol: String,
    /// Request headers, keyed by lowercase name.
    pub headers: HashMap<String, String>,
    /// Free-form per-request storage shared with callbacks.
    pub extensions: HashMap<String, String>,
}

impl RequestEnv {
    /// Create an environment for `method` and `path_info` with usual
    /// defaults for the remaining fields.
    pub fn new(method: impl Into<String>, path_info: impl Into<String>) -> Self {
        RequestEnv {
            method: method.into(),
            path_info: path_info.into(),
            scheme: "http".to_owned(),
            server_name: "localhost".to_owned(),
            server_protocol: "HTTP/1.1".to_owned(),
            ..RequestEnv::default()
        }
    }

    /// Shorthand for a `GET` request environment.
    pub fn get(path_info: impl Into<String>) -> Self {
        RequestEnv::new("GET", path_info)
    }

    /// Add a request header; the name is lowercased.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Set the query string.
    pub fn with_query_string(mut self, query_string: impl Into<String>) -> Self {
        self.query_string = query_string.into();
        self
    }

    /// The request host: the `host` header when present, the server name
    /// otherwise.
    pub fn host(&self) -> &str {
        self.headers
            .get("host")
            .map(String::as_str)
            .unwrap_or(&self.server_name)
    }

    /// The `user-agent` header, if present.
    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get("user-agent").map(String::as_str)
    }
}

/// An HTTP response: status code, headers, and a sequence of body chunks.
#[derive(Clone, Debug, Default)]
pub struct Response {
    /// The HTTP status code.
    pub status: i32,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Body byte chunks.
    pub body: Vec<Vec<u8>>,
}

impl Response {
    /// Create a response with the given status, no headers and an empty
    /// body.
    pub fn new(status: i32) -> Self {
        Response {
            status,
            ..Response::default()
        }
    }

    /// Replace the body chunks.
    pub fn with_body(mut self, body: Vec<Vec<u8>>) -> Self {
        self.body = body;
        self
    }
}

/// Middleware wrapping a [`Handler`] in a request trace.
///
/// Construction resolves the exporter and callbacks once: explicit builder
/// arguments first, then the process-wide default configuration, then
/// no-ops. An instance processes each request on the calling thread and may
/// be shared across threads; per-request state is never shared between
/// invocations.
pub struct RequestTracingMiddleware<S> {
    app: S,
    tracer: Tracer,
    formatters: Vec<Box<dyn HeaderFormatter>>,
    exporter: Arc<dyn SpanExporter>,
    on_start_span: Option<SpanCallback>,
    on_finish_span: Option<SpanCallback>,
}

impl<S> fmt::Debug for RequestTracingMiddleware<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestTracingMiddleware")
            .field("tracer", &self.tracer)
            .field("formatters", &self.formatters)
            .field("exporter", &self.exporter)
            .finish_non_exhaustive()
    }
}

impl<S: Handler> RequestTracingMiddleware<S> {
    /// Start building a middleware around `app`.
    pub fn builder(app: S) -> RequestTracingMiddlewareBuilder<S> {
        RequestTracingMiddlewareBuilder {
            app,
            tracer: None,
            formatters: None,
            exporter: None,
            on_start_span: None,
            on_finish_span: None,
        }
    }

    /// Create a middleware around `app` with everything taken from the
    /// process-wide default configuration.
    pub fn new(app: S) -> Self {
        Self::builder(app).build()
    }

    /// Handle one request.
    ///
    /// Runs the wrapped handler inside a request span and returns its
    /// response (or error) unchanged. The span tree is exported exactly
    /// once before this method returns or unwinds.
    pub fn call(&self, env: &mut RequestEnv) -> HandlerResult {
        let parent = propagation::detect_parent_context(&self.formatters, &env.headers);
        let path = request_path(env);

        self.tracer
            .start_request_trace(parent.as_ref(), false, |trace| {
                // Export runs when the guard drops, after the request span
                // has closed, on every exit path.
                let _export = ExportGuard {
                    trace: trace.clone(),
                    exporter: Arc::clone(&self.exporter),
                };

                trace.in_span(path, |span| {
                    if let Some(on_start_span) = &self.on_start_span {
                        on_start_span(span, env);
                    }
                    self.start_request(span, env);

                    let response = self.app.call(env, span)?;

                    span.set_status(Status::new(StatusCode::from_http(response.status)));
                    if let Some(on_finish_span) = &self.on_finish_span {
                        on_finish_span(span, env);
                    }
                    Ok(response)
                })
            })
    }

    fn start_request(&self, span: &mut Span, env: &RequestEnv) {
        span.set_kind(SpanKind::Server);
        span.put_attribute("http.host", env.host());
        span.put_attribute("http.method", env.method.as_str());
        span.put_attribute("http.path", request_path(env));
        span.put_attribute("http.url", request_url(env));
        span.put_attribute("http.client_protocol", env.server_protocol.as_str());
        span.put_attribute("http.user_agent", env.user_agent().unwrap_or(""));
        span.put_attribute("pid", i64::from(std::process::id()));
        span.put_attribute("tid", format!("{:?}", std::thread::current().id()));
    }
}

/// Builder for [`RequestTracingMiddleware`].
pub struct RequestTracingMiddlewareBuilder<S> {
    app: S,
    tracer: Option<Tracer>,
    formatters: Option<Vec<Box<dyn HeaderFormatter>>>,
    exporter: Option<Arc<dyn SpanExporter>>,
    on_start_span: Option<SpanCallback>,
    on_finish_span: Option<SpanCallback>,
}

impl<S> fmt::Debug for RequestTracingMiddlewareBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestTracingMiddlewareBuilder")
            .field("exporter", &self.exporter)
            .finish_non_exhaustive()
    }
}

impl<S: Handler> RequestTracingMiddlewareBuilder<S> {
    /// Use a custom tracer, e.g. one with a different sampler.
    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Replace the autodetected formatter list. Order is priority order.
    pub fn with_formatters(mut self, formatters: Vec<Box<dyn HeaderFormatter>>) -> Self {
        self.formatters = Some(formatters);
        self
    }

    /// Export captured spans to `exporter` instead of the configured
    /// default.
    pub fn with_exporter(mut self, exporter: impl SpanExporter + 'static) -> Self {
        self.exporter = Some(Arc::new(exporter));
        self
    }

    /// A callback evaluated after the request span is created, before the
    /// handler runs.
    pub fn with_on_start_span(
        mut self,
        callback: impl Fn(&mut Span, &RequestEnv) + Send + Sync + 'static,
    ) -> Self {
        self.on_start_span = Some(Arc::new(callback));
        self
    }

    /// A callback evaluated after the response status is assigned, before
    /// export.
    pub fn with_on_finish_span(
        mut self,
        callback: impl Fn(&mut Span, &RequestEnv) + Send + Sync + 'static,
    ) -> Self {
        self.on_finish_span = Some(Arc::new(callback));
        self
    }

    /// Resolve the remaining settings from the process-wide default
    /// configuration and build the middleware.
    pub fn build(self) -> RequestTracingMiddleware<S> {
        let defaults = config::default_config();
        RequestTracingMiddleware {
            app: self.app,
            tracer: self.tracer.unwrap_or_default(),
            formatters: self
                .formatters
                .unwrap_or_else(propagation::autodetectable_formatters),
            exporter: self.exporter.unwrap_or_else(|| defaults.exporter()),
            on_start_span: self.on_start_span.or_else(|| defaults.on_start_span()),
            on_finish_span: self.on_finish_span.or_else(|| defaults.on_finish_span()),
        }
    }
}

/// The logical request path: script name plus path info, `/`-prefixed.
fn request_path(env: &RequestEnv) -> String {
    let path = format!("{}{}", env.script_name, env.path_info);
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

/// The full request URL; the query suffix is only appended when the query
/// string is non-empty.
fn request_url(env: &RequestEnv) -> String {
    let url = format!("{}://{}{}", env.scheme, env.host(), request_path(env));
    if env.query_string.is_empty() {
        url
    } else {
        format!("{}?{}", url, env.query_string)
    }
}

/// Scope guard that exports the request's span tree when dropped.
struct ExportGuard {
    trace: RequestTrace,
    exporter: Arc<dyn SpanExporter>,
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        let tree = self.trace.build_contained_spans();
        // An export failure is the exporter's concern; it must never mask
        // a handler failure that is already propagating.
        if let Err(err) = self.exporter.export(tree) {
            tracing::warn!(error = %err, "span tree export failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_normalization() {
        let mut env = RequestEnv::get("/lengthy");
        assert_eq!(request_path(&env), "/lengthy");

        env.script_name = "app".to_owned();
        env.path_info = "/status".to_owned();
        assert_eq!(request_path(&env), "/app/status");

        env.script_name = String::new();
        env.path_info = "status".to_owned();
        assert_eq!(request_path(&env), "/status");
    }

    #[test]
    fn path_normalization_is_idempotent() {
        let mut env = RequestEnv::get("/already/normal");
        let once = request_path(&env);
        env.script_name = String::new();
        env.path_info = once.clone();
        assert_eq!(request_path(&env), once);
    }

    #[test]
    fn url_reconstruction() {
        let env = RequestEnv::get("/search").with_header("host", "example.com");
        assert_eq!(request_url(&env), "http://example.com/search");

        let env = env.with_query_string("q=trace");
        assert_eq!(request_url(&env), "http://example.com/search?q=trace");
    }

    #[test]
    fn url_falls_back_to_server_name() {
        let env = RequestEnv::get("/");
        assert_eq!(request_url(&env), "http://localhost/");
    }
}
