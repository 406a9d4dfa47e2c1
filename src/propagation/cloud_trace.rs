//! Google Cloud Trace header formatter.

use crate::propagation::HeaderFormatter;
use crate::trace_context::{PropagationContext, SpanId, TraceFlags, TraceId};

const CLOUD_TRACE_HEADER: &str = "x-cloud-trace-context";

/// Formatter for the `X-Cloud-Trace-Context` header.
///
/// The value carries a 32-hex-digit trace id, a decimal span id and an
/// optional options field:
///
/// `X-Cloud-Trace-Context: 105445aa7843bc8bf206b12000100000/1;o=1`
///
/// Bit 0 of the options field is the sampled flag. A missing options field
/// is treated as options `0`.
#[derive(Clone, Debug, Default)]
pub struct CloudTraceFormatter {
    _private: (),
}

impl CloudTraceFormatter {
    /// Create a new `CloudTraceFormatter`.
    pub fn new() -> Self {
        CloudTraceFormatter { _private: () }
    }

    fn parse(&self, header_value: &str) -> Result<PropagationContext, ()> {
        let value = header_value.trim();
        let (ids, options) = match value.split_once(';') {
            Some((ids, rest)) => {
                let options = rest.strip_prefix("o=").ok_or(())?;
                (ids, options.parse::<u8>().map_err(|_| ())?)
            }
            None => (value, 0),
        };

        let (trace_part, span_part) = ids.split_once('/').ok_or(())?;
        if trace_part.len() != 32 {
            return Err(());
        }
        // Header producers are allowed to send uppercase hex here.
        let trace_id = TraceId::from_hex(&trace_part.to_ascii_lowercase()).map_err(|_| ())?;

        // The span id is decimal, unlike traceparent.
        let span_id = SpanId::from(span_part.parse::<u64>().map_err(|_| ())?);

        let trace_options = TraceFlags::new(options) & TraceFlags::SAMPLED;

        let context = PropagationContext::new(trace_id, span_id, trace_options);
        if !context.is_valid() {
            return Err(());
        }

        Ok(context)
    }
}

impl HeaderFormatter for CloudTraceFormatter {
    fn header_name(&self) -> &'static str {
        CLOUD_TRACE_HEADER
    }

    fn deserialize(&self, value: &str) -> Option<PropagationContext> {
        self.parse(value).ok()
    }

    fn serialize(&self, context: &PropagationContext) -> String {
        format!(
            "{}/{};o={}",
            context.trace_id(),
            u64::from_be_bytes(context.span_id().to_bytes()),
            context.trace_options().to_u8() & TraceFlags::SAMPLED.to_u8()
        )
    }
}
