//! W3C Trace Context header formatter.

use crate::propagation::HeaderFormatter;
use crate::trace_context::{PropagationContext, SpanId, TraceFlags, TraceId};

const SUPPORTED_VERSION: u8 = 0;
const MAX_VERSION: u8 = 254;
const TRACEPARENT_HEADER: &str = "traceparent";

/// Formatter for the [W3C TraceContext] `traceparent` header.
///
/// A `traceparent` value carries four dash-separated fields:
///
/// `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
///
///    - version
///    - trace-id
///    - parent-id
///    - trace-flags
///
/// [W3C TraceContext]: https://www.w3.org/TR/trace-context/
#[derive(Clone, Debug, Default)]
pub struct TraceContextFormatter {
    _private: (),
}

impl TraceContextFormatter {
    /// Create a new `TraceContextFormatter`.
    pub fn new() -> Self {
        TraceContextFormatter { _private: () }
    }

    fn parse(&self, header_value: &str) -> Result<PropagationContext, ()> {
        let parts = header_value
            .trim()
            .split_terminator('-')
            .collect::<Vec<&str>>();
        // Ensure parts are not out of range.
        if parts.len() < 4 {
            return Err(());
        }

        // Ensure version is within range, for version 0 there must be 4 parts.
        if parts[0].len() != 2 {
            return Err(());
        }
        let version = u8::from_str_radix(parts[0], 16).map_err(|_| ())?;
        if version > MAX_VERSION || version == 0 && parts.len() != 4 {
            return Err(());
        }

        // Ensure field widths match the format exactly; from_hex alone would
        // accept short values.
        if parts[1].len() != 32 || parts[2].len() != 16 || parts[3].len() != 2 {
            return Err(());
        }

        // Ensure trace id is lowercase
        if parts[1].chars().any(|c| c.is_ascii_uppercase()) {
            return Err(());
        }
        let trace_id = TraceId::from_hex(parts[1]).map_err(|_| ())?;

        // Ensure span id is lowercase
        if parts[2].chars().any(|c| c.is_ascii_uppercase()) {
            return Err(());
        }
        let span_id = SpanId::from_hex(parts[2]).map_err(|_| ())?;

        // Parse trace flags section
        let opts = u8::from_str_radix(parts[3], 16).map_err(|_| ())?;

        // Ensure opts are valid for version 0
        if version == 0 && opts > 2 {
            return Err(());
        }

        // Clear all flags other than the supported sampling bit.
        let trace_options = TraceFlags::new(opts) & TraceFlags::SAMPLED;

        let context = PropagationContext::new(trace_id, span_id, trace_options);
        if !context.is_valid() {
            return Err(());
        }

        Ok(context)
    }
}

impl HeaderFormatter for TraceContextFormatter {
    fn header_name(&self) -> &'static str {
        TRACEPARENT_HEADER
    }

    fn deserialize(&self, value: &str) -> Option<PropagationContext> {
        self.parse(value).ok()
    }

    fn serialize(&self, context: &PropagationContext) -> String {
        format!(
            "{:02x}-{}-{}-{:02x}",
            SUPPORTED_VERSION,
            context.trace_id(),
            context.span_id(),
            context.trace_options() & TraceFlags::SAMPLED
        )
    }
}
