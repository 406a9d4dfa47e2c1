use std::fmt;

use crate::error::TraceError;
use crate::trace::SpanTree;

/// Result of an export call.
pub type ExportResult = Result<(), TraceError>;

/// Receives the finished span tree of a request.
///
/// Exporters are shared across requests and must be safe for concurrent
/// invocation; the middleware calls [`export`](SpanExporter::export) exactly
/// once per request, from whichever thread handled it. Export failures are
/// the exporter's concern: the caller logs them and never lets them mask an
/// in-flight handler failure.
pub trait SpanExporter: Send + Sync + fmt::Debug {
    /// Export a finished span tree. Must not block indefinitely.
    fn export(&self, tree: SpanTree) -> ExportResult;
}

/// [`SpanExporter`] that drops every tree.
#[derive(Clone, Debug, Default)]
pub struct NoopSpanExporter {
    _private: (),
}

impl NoopSpanExporter {
    /// Create a new no-op exporter.
    pub fn new() -> Self {
        NoopSpanExporter::default()
    }
}

impl SpanExporter for NoopSpanExporter {
    fn export(&self, _tree: SpanTree) -> ExportResult {
        Ok(())
    }
}

/// [`SpanExporter`] that emits each span tree as a JSON log event.
///
/// This is the process-wide default: without further configuration every
/// request trace ends up in the log stream, where a subscriber can ship it
/// to a backend or simply print it.
#[derive(Clone, Debug, Default)]
pub struct LoggingSpanExporter {
    _private: (),
}

impl LoggingSpanExporter {
    /// Create a new logging exporter.
    pub fn new() -> Self {
        LoggingSpanExporter::default()
    }
}

impl SpanExporter for LoggingSpanExporter {
    fn export(&self, tree: SpanTree) -> ExportResult {
        let payload =
            serde_json::to_string(&tree).map_err(|err| TraceError::Export(err.to_string()))?;
        tracing::info!(
            target: "reqtrace::export",
            trace_id = %tree.trace_id(),
            spans = tree.spans().len(),
            %payload,
            "span tree exported"
        );
        Ok(())
    }
}
