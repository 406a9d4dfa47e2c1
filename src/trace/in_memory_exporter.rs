use std::sync::{Arc, Mutex};

use crate::error::TraceError;
use crate::trace::export::{ExportResult, SpanExporter};
use crate::trace::SpanTree;

/// An in-memory span exporter that stores exported trees in memory.
///
/// This exporter is useful for testing and debugging purposes. The trees
/// can be retrieved using the [`get_finished_trees`] method.
///
/// [`get_finished_trees`]: InMemorySpanExporter::get_finished_trees
///
/// # Example
///
/// ```
/// use reqtrace::trace::{InMemorySpanExporter, SpanExporter, Tracer};
///
/// let exporter = InMemorySpanExporter::default();
/// Tracer::default().start_request_trace(None, false, |trace| {
///     trace.in_span("say hello", |_span| {});
///     exporter.export(trace.build_contained_spans()).unwrap();
/// });
///
/// let trees = exporter.get_finished_trees().unwrap();
/// assert_eq!(trees.len(), 1);
/// assert_eq!(trees[0].root().unwrap().name, "say hello");
/// ```
#[derive(Clone, Debug)]
pub struct InMemorySpanExporter {
    trees: Arc<Mutex<Vec<SpanTree>>>,
}

impl Default for InMemorySpanExporter {
    fn default() -> Self {
        InMemorySpanExporterBuilder::new().build()
    }
}

/// Builder for [`InMemorySpanExporter`].
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporterBuilder {}

impl InMemorySpanExporterBuilder {
    /// Creates a new instance of the `InMemorySpanExporterBuilder`.
    pub fn new() -> Self {
        Self {}
    }

    /// Creates a new instance of the `InMemorySpanExporter`.
    pub fn build(&self) -> InMemorySpanExporter {
        InMemorySpanExporter {
            trees: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl InMemorySpanExporter {
    /// Returns the exported trees in export order.
    ///
    /// # Errors
    ///
    /// Returns a `TraceError` if the internal lock cannot be acquired.
    pub fn get_finished_trees(&self) -> Result<Vec<SpanTree>, TraceError> {
        self.trees
            .lock()
            .map(|trees| trees.clone())
            .map_err(TraceError::from)
    }

    /// Clears the internal storage of exported trees.
    pub fn reset(&self) {
        let _ = self.trees.lock().map(|mut trees| trees.clear());
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&self, tree: SpanTree) -> ExportResult {
        self.trees
            .lock()
            .map(|mut trees| trees.push(tree))
            .map_err(|err| TraceError::Export(format!("failed to lock trees: {err:?}")))
    }
}
