use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Mutex};

use rand::{rngs, Rng, SeedableRng};

use crate::trace::sampler::{AlwaysOn, Sampler};
use crate::trace::span::{run_scoped, Span};
use crate::trace::{SpanData, SpanTree};
use crate::trace_context::{PropagationContext, SpanId, TraceFlags, TraceId};

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_os_rng());
}

pub(crate) fn next_trace_id() -> TraceId {
    CURRENT_RNG.with(|rng| TraceId::from(rng.borrow_mut().random::<u128>()))
}

pub(crate) fn next_span_id() -> SpanId {
    CURRENT_RNG.with(|rng| SpanId::from(rng.borrow_mut().random::<u64>()))
}

/// Trace-level state shared by all span handles of one request.
#[derive(Debug)]
pub(crate) struct TraceShared {
    pub(crate) trace_id: TraceId,
    pub(crate) trace_options: TraceFlags,
    pub(crate) remote_parent: Option<SpanId>,
    pub(crate) same_process_as_parent: bool,
    pub(crate) spans: Mutex<Vec<SpanData>>,
}

/// Starts request traces, either continuing a propagated parent context or
/// opening a fresh trace root.
pub struct Tracer {
    sampler: Arc<dyn Sampler>,
}

impl Default for Tracer {
    fn default() -> Self {
        Tracer::new(AlwaysOn)
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("sampler", &self.sampler)
            .finish()
    }
}

impl Tracer {
    /// Create a tracer with the given sampler.
    pub fn new(sampler: impl Sampler + 'static) -> Self {
        Tracer {
            sampler: Arc::new(sampler),
        }
    }

    /// Run `f` inside a new request trace.
    ///
    /// When `parent` is present the trace id and trace options are continued
    /// from it and the parent's span id becomes the parent of the request
    /// span; otherwise a fresh trace id is generated and the sampler decides
    /// the sampled flag. `same_process_as_parent` is recorded on spans opened
    /// directly under the remote parent; the middleware always passes `false`
    /// here to mark the process boundary.
    ///
    /// The request-local trace state lives exactly as long as this call;
    /// concurrent invocations are fully independent.
    pub fn start_request_trace<R>(
        &self,
        parent: Option<&PropagationContext>,
        same_process_as_parent: bool,
        f: impl FnOnce(&RequestTrace) -> R,
    ) -> R {
        let (trace_id, remote_parent, trace_options) = match parent {
            Some(context) => (
                context.trace_id(),
                Some(context.span_id()),
                context.trace_options(),
            ),
            None => (
                next_trace_id(),
                None,
                TraceFlags::default().with_sampled(self.sampler.decide(None)),
            ),
        };

        let trace = RequestTrace {
            shared: Arc::new(TraceShared {
                trace_id,
                trace_options,
                remote_parent,
                same_process_as_parent,
                spans: Mutex::new(Vec::new()),
            }),
        };
        f(&trace)
    }
}

/// Handle on the span context of one in-flight request.
///
/// Cloning is cheap and clones refer to the same request-local trace state.
/// Handles may be shared across threads to create concurrent child spans
/// under one root.
#[derive(Clone, Debug)]
pub struct RequestTrace {
    shared: Arc<TraceShared>,
}

impl RequestTrace {
    /// The id of this request's trace.
    pub fn trace_id(&self) -> TraceId {
        self.shared.trace_id
    }

    /// Trace options this trace was started with.
    pub fn trace_options(&self) -> TraceFlags {
        self.shared.trace_options
    }

    /// Run `f` inside a named span parented at this trace's remote parent
    /// (or at the trace root when there is none).
    ///
    /// The span's end timestamp is recorded when `f` returns, or during
    /// unwinding if `f` panics.
    pub fn in_span<R>(&self, name: impl Into<String>, f: impl FnOnce(&mut Span) -> R) -> R {
        run_scoped(
            Arc::clone(&self.shared),
            name.into(),
            self.shared.remote_parent,
            self.shared.same_process_as_parent,
            f,
        )
    }

    /// Snapshot the finished spans of this request as an immutable tree.
    pub fn build_contained_spans(&self) -> SpanTree {
        let spans = match self.shared.spans.lock() {
            Ok(guard) => guard.clone(),
            // A panic while a span record was being pushed must not lose
            // the already finished spans.
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        SpanTree::new(self.shared.trace_id, self.shared.trace_options, spans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn continues_parent_context() {
        let parent = PropagationContext::new(
            TraceId::from(0x4bf9_2f35u128),
            SpanId::from(0x00f0_67aau64),
            TraceFlags::SAMPLED,
        );
        let tracer = Tracer::default();
        tracer.start_request_trace(Some(&parent), false, |trace| {
            assert_eq!(trace.trace_id(), parent.trace_id());
            assert!(trace.trace_options().is_sampled());

            trace.in_span("request", |_span| {});
            let tree = trace.build_contained_spans();
            let root = tree.root().expect("root span recorded");
            assert_eq!(root.parent_span_id, Some(parent.span_id()));
            assert!(!root.same_process_as_parent);
        });
    }

    #[test]
    fn fresh_root_without_parent() {
        let tracer = Tracer::default();
        tracer.start_request_trace(None, false, |trace| {
            assert_ne!(trace.trace_id(), TraceId::INVALID);
            assert!(trace.trace_options().is_sampled());

            trace.in_span("request", |_span| {});
            let tree = trace.build_contained_spans();
            assert_eq!(tree.root().unwrap().parent_span_id, None);
        });
    }

    #[test]
    fn unsampled_when_sampler_declines() {
        #[derive(Debug)]
        struct Never;
        impl Sampler for Never {
            fn decide(&self, _context: Option<&PropagationContext>) -> bool {
                false
            }
        }

        let tracer = Tracer::new(Never);
        tracer.start_request_trace(None, false, |trace| {
            assert!(!trace.trace_options().is_sampled());
        });
    }

    #[test]
    fn nested_spans_form_a_tree() {
        let tracer = Tracer::default();
        tracer.start_request_trace(None, false, |trace| {
            trace.in_span("request", |span| {
                span.in_span("long task", |child| {
                    child.put_attribute("step", 1i64);
                });
            });

            let tree = trace.build_contained_spans();
            assert_eq!(tree.spans().len(), 2);
            let root = tree.root().unwrap();
            assert_eq!(root.name, "request");
            let child = tree.spans().iter().find(|s| s.name == "long task").unwrap();
            assert_eq!(child.parent_span_id, Some(root.span_id));
            assert!(child.same_process_as_parent);
            assert!(child.end_time <= root.end_time);
        });
    }

    #[test]
    fn span_recorded_when_body_panics() {
        let tracer = Tracer::default();
        tracer.start_request_trace(None, false, |trace| {
            let result = catch_unwind(AssertUnwindSafe(|| {
                trace.in_span("request", |_span| panic!("boom"));
            }));
            assert!(result.is_err());

            let tree = trace.build_contained_spans();
            assert_eq!(tree.spans().len(), 1);
            assert_eq!(tree.root().unwrap().status, None);
        });
    }
}
