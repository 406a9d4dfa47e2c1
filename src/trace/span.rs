use std::sync::Arc;
use std::time::SystemTime;

use crate::trace::tracer::{next_span_id, TraceShared};
use crate::trace::{SpanData, SpanKind, Status, Value};
use crate::trace_context::SpanId;

/// Handle on one in-progress span.
///
/// The handle is transient: it is only valid for the duration of the scope
/// that opened it, and the underlying record is owned by the request-local
/// trace state. The span's end timestamp is recorded exactly once, either
/// when the scope closes normally or when the handle is dropped during
/// unwinding.
#[derive(Debug)]
pub struct Span {
    shared: Arc<TraceShared>,
    data: Option<SpanData>,
}

/// Open a span, run `f` with it, and close it on all exit paths.
pub(crate) fn run_scoped<R>(
    shared: Arc<TraceShared>,
    name: String,
    parent_span_id: Option<SpanId>,
    same_process_as_parent: bool,
    f: impl FnOnce(&mut Span) -> R,
) -> R {
    let mut span = Span::start(shared, name, parent_span_id, same_process_as_parent);
    let result = f(&mut span);
    span.end();
    result
}

impl Span {
    fn start(
        shared: Arc<TraceShared>,
        name: String,
        parent_span_id: Option<SpanId>,
        same_process_as_parent: bool,
    ) -> Self {
        let now = SystemTime::now();
        Span {
            shared,
            data: Some(SpanData {
                span_id: next_span_id(),
                parent_span_id,
                name,
                kind: SpanKind::Unspecified,
                attributes: Default::default(),
                status: None,
                start_time: now,
                end_time: now,
                same_process_as_parent,
            }),
        }
    }

    /// The id of this span.
    pub fn span_id(&self) -> SpanId {
        self.data.as_ref().map(|d| d.span_id).unwrap_or(SpanId::INVALID)
    }

    /// The operation name.
    pub fn name(&self) -> &str {
        self.data.as_ref().map(|d| d.name.as_str()).unwrap_or("")
    }

    /// Set the kind of operation this span describes.
    pub fn set_kind(&mut self, kind: SpanKind) {
        if let Some(data) = self.data.as_mut() {
            data.kind = kind;
        }
    }

    /// Set a span attribute. Writing an existing key replaces its value.
    pub fn put_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        if let Some(data) = self.data.as_mut() {
            data.attributes.insert(key.into(), value.into());
        }
    }

    /// Set the span status, replacing any previously assigned one.
    pub fn set_status(&mut self, status: impl Into<Status>) {
        if let Some(data) = self.data.as_mut() {
            data.status = Some(status.into());
        }
    }

    /// The currently assigned status, if any.
    pub fn status(&self) -> Option<&Status> {
        self.data.as_ref().and_then(|d| d.status.as_ref())
    }

    /// Run `f` inside a named child span of this span.
    ///
    /// Child spans may be created concurrently from clones of the owning
    /// [`RequestTrace`](crate::trace::RequestTrace); closure of each child
    /// is guaranteed on normal and panicking exit.
    pub fn in_span<R>(&self, name: impl Into<String>, f: impl FnOnce(&mut Span) -> R) -> R {
        let parent = self.data.as_ref().map(|d| d.span_id);
        run_scoped(Arc::clone(&self.shared), name.into(), parent, true, f)
    }

    fn end(&mut self) {
        if let Some(mut data) = self.data.take() {
            data.end_time = SystemTime::now();
            match self.shared.spans.lock() {
                Ok(mut spans) => spans.push(data),
                Err(err) => {
                    tracing::warn!(error = %err, "span record lost: trace state poisoned");
                }
            }
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        self.end();
    }
}
