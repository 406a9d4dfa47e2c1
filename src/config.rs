//! Process-wide tracing configuration.
//!
//! The default configuration is an initialized-once object: the first call
//! to [`set_default_config`] (or, lazily, the first read) fixes it for the
//! lifetime of the process, and it is read-only afterwards. Middleware
//! instances resolve their settings once at construction, falling back to
//! this default for anything not given explicitly.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::TraceError;
use crate::middleware::RequestEnv;
use crate::trace::{LoggingSpanExporter, Span, SpanExporter};

/// A callback invoked with the request span and the request environment.
///
/// Used for the `on_start_span` / `on_finish_span` hooks; side effects such
/// as extra attributes are visible to the exporter.
pub type SpanCallback = Arc<dyn Fn(&mut Span, &RequestEnv) + Send + Sync>;

static DEFAULT_CONFIG: OnceLock<TracingConfig> = OnceLock::new();

/// Resolved tracing configuration.
#[derive(Clone)]
pub struct TracingConfig {
    exporter: Arc<dyn SpanExporter>,
    on_start_span: Option<SpanCallback>,
    on_finish_span: Option<SpanCallback>,
}

impl Default for TracingConfig {
    /// The built-in default: span trees are logged as JSON, no callbacks.
    fn default() -> Self {
        TracingConfig {
            exporter: Arc::new(LoggingSpanExporter::new()),
            on_start_span: None,
            on_finish_span: None,
        }
    }
}

impl fmt::Debug for TracingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingConfig")
            .field("exporter", &self.exporter)
            .field("on_start_span", &self.on_start_span.as_ref().map(|_| ".."))
            .field("on_finish_span", &self.on_finish_span.as_ref().map(|_| ".."))
            .finish()
    }
}

impl TracingConfig {
    /// Start building a configuration.
    pub fn builder() -> TracingConfigBuilder {
        TracingConfigBuilder::default()
    }

    /// The configured exporter.
    pub fn exporter(&self) -> Arc<dyn SpanExporter> {
        Arc::clone(&self.exporter)
    }

    /// The configured span-start callback, if any.
    pub fn on_start_span(&self) -> Option<SpanCallback> {
        self.on_start_span.clone()
    }

    /// The configured span-finish callback, if any.
    pub fn on_finish_span(&self) -> Option<SpanCallback> {
        self.on_finish_span.clone()
    }
}

/// Builder for [`TracingConfig`].
#[derive(Default)]
pub struct TracingConfigBuilder {
    exporter: Option<Arc<dyn SpanExporter>>,
    on_start_span: Option<SpanCallback>,
    on_finish_span: Option<SpanCallback>,
}

impl fmt::Debug for TracingConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingConfigBuilder")
            .field("exporter", &self.exporter)
            .finish_non_exhaustive()
    }
}

impl TracingConfigBuilder {
    /// Set the exporter span trees are handed to.
    pub fn with_exporter(mut self, exporter: impl SpanExporter + 'static) -> Self {
        self.exporter = Some(Arc::new(exporter));
        self
    }

    /// Set a callback evaluated after the request span is created, before
    /// the downstream handler runs.
    pub fn with_on_start_span(
        mut self,
        callback: impl Fn(&mut Span, &RequestEnv) + Send + Sync + 'static,
    ) -> Self {
        self.on_start_span = Some(Arc::new(callback));
        self
    }

    /// Set a callback evaluated after the response status is assigned,
    /// before export.
    pub fn with_on_finish_span(
        mut self,
        callback: impl Fn(&mut Span, &RequestEnv) + Send + Sync + 'static,
    ) -> Self {
        self.on_finish_span = Some(Arc::new(callback));
        self
    }

    /// Build the configuration, using the built-in defaults for anything
    /// not set.
    pub fn build(self) -> TracingConfig {
        let defaults = TracingConfig::default();
        TracingConfig {
            exporter: self.exporter.unwrap_or(defaults.exporter),
            on_start_span: self.on_start_span,
            on_finish_span: self.on_finish_span,
        }
    }
}

/// Install the process-wide default configuration.
///
/// May be called at most once, before the default is first read; later
/// calls return [`TraceError::ConfigAlreadySet`].
pub fn set_default_config(config: TracingConfig) -> Result<(), TraceError> {
    DEFAULT_CONFIG
        .set(config)
        .map_err(|_| TraceError::ConfigAlreadySet)
}

/// The process-wide default configuration.
///
/// Initializes the built-in default on first read if none was installed.
pub fn default_config() -> &'static TracingConfig {
    DEFAULT_CONFIG.get_or_init(TracingConfig::default)
}
