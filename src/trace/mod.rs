//! Span model and span-tree collaborators.
//!
//! This module provides the request-local span machinery the middleware
//! orchestrates: a [`Tracer`] that starts request traces, scoped [`Span`]
//! handles with guaranteed closure, and [`SpanExporter`] implementations
//! that receive the finished [`SpanTree`] once per request.

mod export;
mod in_memory_exporter;
mod sampler;
mod span;
mod status;
mod tracer;

pub use export::{ExportResult, LoggingSpanExporter, NoopSpanExporter, SpanExporter};
pub use in_memory_exporter::{InMemorySpanExporter, InMemorySpanExporterBuilder};
pub use sampler::{AlwaysOn, Sampler};
pub use span::Span;
pub use status::{Status, StatusCode};
pub use tracer::{RequestTrace, Tracer};

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use serde::Serialize;

use crate::trace_context::{SpanId, TraceFlags, TraceId};

/// The relationship between a span, its parents and its children in a trace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum SpanKind {
    /// Default value. The kind of the span is unknown.
    #[default]
    Unspecified,
    /// The span covers server-side handling of a remote request.
    Server,
    /// The span describes a request to some remote service.
    Client,
}

/// A scalar span attribute value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// A boolean value.
    Bool(bool),
    /// A signed 64-bit integer value.
    I64(i64),
    /// A 64-bit float value.
    F64(f64),
    /// A string value.
    String(String),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => v.fmt(f),
            Value::I64(v) => v.fmt(f),
            Value::F64(v) => v.fmt(f),
            Value::String(v) => v.fmt(f),
        }
    }
}

/// Immutable record of one finished span.
#[derive(Clone, Debug, Serialize)]
pub struct SpanData {
    /// The id of this span.
    pub span_id: SpanId,
    /// The id of the parent span, `None` for a trace root.
    pub parent_span_id: Option<SpanId>,
    /// The operation name.
    pub name: String,
    /// The kind of operation this span describes.
    pub kind: SpanKind,
    /// Span attributes. Keys are unique; the last write wins.
    pub attributes: HashMap<String, Value>,
    /// The span status, unset until instrumented code assigns one.
    pub status: Option<Status>,
    /// When the operation started.
    pub start_time: SystemTime,
    /// When the operation ended.
    pub end_time: SystemTime,
    /// Whether the parent span ran in the same process as this span.
    pub same_process_as_parent: bool,
}

/// The set of spans created during one root-span scope.
///
/// Built once at scope exit and immutable afterwards; ownership transfers
/// to the exporter on export.
#[derive(Clone, Debug, Serialize)]
pub struct SpanTree {
    trace_id: TraceId,
    trace_options: TraceFlags,
    spans: Vec<SpanData>,
}

impl SpanTree {
    pub(crate) fn new(trace_id: TraceId, trace_options: TraceFlags, spans: Vec<SpanData>) -> Self {
        SpanTree {
            trace_id,
            trace_options,
            spans,
        }
    }

    /// The id of the trace all contained spans belong to.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// Trace options the trace was started with.
    pub fn trace_options(&self) -> TraceFlags {
        self.trace_options
    }

    /// All finished spans of this request, children before their parents.
    pub fn spans(&self) -> &[SpanData] {
        &self.spans
    }

    /// The request span: the contained span whose parent is absent or not
    /// itself contained in the tree.
    pub fn root(&self) -> Option<&SpanData> {
        self.spans.iter().find(|span| match span.parent_span_id {
            None => true,
            Some(parent) => !self.spans.iter().any(|other| other.span_id == parent),
        })
    }
}
