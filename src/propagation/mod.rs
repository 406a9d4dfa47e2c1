//! Propagation-header formatters and autodetection.
//!
//! Each formatter understands one wire format for the parent trace context.
//! The middleware consults an ordered list: the first formatter whose header
//! is present in the request wins, by registration order, even when several
//! matching headers exist. A present-but-malformed value parses to `None`
//! and is treated as "no parent context".

mod cloud_trace;
mod trace_context;

pub use cloud_trace::CloudTraceFormatter;
pub use trace_context::TraceContextFormatter;

use std::collections::HashMap;
use std::fmt;

use crate::trace_context::PropagationContext;

/// Parses and serializes one propagation-header format.
pub trait HeaderFormatter: Send + Sync + fmt::Debug {
    /// The lowercase header name this formatter recognizes.
    fn header_name(&self) -> &'static str;

    /// Parse a header value into a parent context.
    ///
    /// Returns `None` on malformed input; never fails to the caller.
    fn deserialize(&self, value: &str) -> Option<PropagationContext>;

    /// Serialize a context into this formatter's header value.
    fn serialize(&self, context: &PropagationContext) -> String;
}

/// The formatters consulted by default, in priority order.
pub fn autodetectable_formatters() -> Vec<Box<dyn HeaderFormatter>> {
    vec![
        Box::new(CloudTraceFormatter::new()),
        Box::new(TraceContextFormatter::new()),
    ]
}

/// Select the first registered formatter whose header is present and parse
/// its value.
///
/// Only one formatter is consulted: if the selected header's value is
/// malformed, later formatters are not tried and the request becomes a new
/// trace root.
pub fn detect_parent_context(
    formatters: &[Box<dyn HeaderFormatter>],
    headers: &HashMap<String, String>,
) -> Option<PropagationContext> {
    let formatter = formatters
        .iter()
        .find(|f| headers.contains_key(f.header_name()))?;
    formatter.deserialize(headers.get(formatter.header_name())?)
}
