//! W3C Trace Context propagation for outgoing calls.
//!
//! When telemetry is enabled the executor attaches a `traceparent` header
//! (and `tracestate` when present) to every attempt. The context comes from
//! the current `tracing` span when an OpenTelemetry layer is installed;
//! otherwise a fresh sampled root context is generated.
//!
//! Header format: `{version}-{trace_id}-{parent_id}-{trace_flags}`, for example
//! `00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`.

use std::fmt;

use http::{HeaderMap, HeaderValue};
use opentelemetry::trace::TraceContextExt;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Header carrying the trace and parent span ids.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Header carrying vendor-specific trace state.
pub const TRACESTATE_HEADER: &str = "tracestate";

/// Trace flags bit for sampled traces.
const TRACE_FLAG_SAMPLED: u8 = 0x01;

/// Trace context propagated with an outgoing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// 32 lowercase hex chars.
    pub trace_id: String,
    /// 16 lowercase hex chars; becomes the server's parent id.
    pub span_id: String,
    /// W3C trace flags.
    pub trace_flags: u8,
    /// Vendor trace state, if any.
    pub trace_state: Option<String>,
}

impl TraceContext {
    /// Generates a sampled root context with random ids.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            trace_id: format!("{:032x}", nonzero_u128()),
            span_id: format!("{:016x}", nonzero_u64()),
            trace_flags: TRACE_FLAG_SAMPLED,
            trace_state: None,
        }
    }

    /// Returns the context of the current span, or a generated one when the
    /// span carries no valid OpenTelemetry context.
    #[must_use]
    pub fn current() -> Self {
        from_current_span().unwrap_or_else(Self::generate)
    }

    /// Formats the `traceparent` header value.
    #[must_use]
    pub fn to_traceparent(&self) -> String {
        format!("00-{}-{}-{:02x}", self.trace_id, self.span_id, self.trace_flags)
    }

    /// Writes `traceparent` (and `tracestate`) into `headers`, replacing
    /// existing values.
    pub fn inject(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.to_traceparent()) {
            headers.insert(TRACEPARENT_HEADER, value);
        }
        if let Some(state) = self.trace_state.as_deref()
            && let Ok(value) = HeaderValue::from_str(state)
        {
            headers.insert(TRACESTATE_HEADER, value);
        }
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_traceparent())
    }
}

fn nonzero_u128() -> u128 {
    loop {
        let id = rand::random::<u128>();
        if id != 0 {
            return id;
        }
    }
}

fn nonzero_u64() -> u64 {
    loop {
        let id = rand::random::<u64>();
        if id != 0 {
            return id;
        }
    }
}

fn from_current_span() -> Option<TraceContext> {
    let otel_context = tracing::Span::current().context();
    let span_ref = otel_context.span();
    let span_context = span_ref.span_context();

    if !span_context.is_valid() {
        return None;
    }

    let header = span_context.trace_state().header();
    Some(TraceContext {
        trace_id: span_context.trace_id().to_string(),
        span_id: span_context.span_id().to_string(),
        trace_flags: span_context.trace_flags().to_u8(),
        trace_state: if header.is_empty() { None } else { Some(header) },
    })
}
