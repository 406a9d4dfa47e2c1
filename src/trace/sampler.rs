use std::fmt;

use crate::trace_context::PropagationContext;

/// Decides whether a new request trace is sampled.
///
/// The decision is only consulted when a request arrives without a parent
/// context; a parent's trace options carry through unchanged.
pub trait Sampler: Send + Sync + fmt::Debug {
    /// Returns `true` if the trace seeded by `context` should be sampled.
    fn decide(&self, context: Option<&PropagationContext>) -> bool;
}

/// [`Sampler`] that samples every trace.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysOn;

impl Sampler for AlwaysOn {
    fn decide(&self, _context: Option<&PropagationContext>) -> bool {
        true
    }
}
