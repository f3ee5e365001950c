//! Client-side metrics.
//!
//! Generated clients report through the [`SdkMetrics`] trait. Two sinks ship
//! with the crate:
//!
//! - [`NoopSdkMetrics`]: discards everything; used when telemetry is disabled.
//! - [`MetricsSdkMetrics`]: forwards to the [`metrics`](https://docs.rs/metrics)
//!   facade, so whichever recorder the process installs receives the data.
//!
//! # Metric Names
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `relaykit_sdk_requests_total` | Counter | `operation`, `outcome` | Finished calls by outcome |
//! | `relaykit_sdk_request_duration_seconds` | Histogram | `operation` | End-to-end call latency, retries included |
//! | `relaykit_sdk_retries_total` | Counter | `operation`, `attempt`, `error_type` | Re-attempts after a transient failure |
//! | `relaykit_sdk_payload_bytes` | Histogram | `operation`, `direction` | Encoded request and response sizes |
//! | `relaykit_sdk_connections_total` | Counter | `target`, `event` | Binding lifecycle events |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use relaykit_sdk::{ClientConfig, MetricsSdkMetrics};
//!
//! let config = ClientConfig::new("https://api.example.com")
//!     .with_metrics(Arc::new(MetricsSdkMetrics));
//! ```

use std::{fmt, sync::Arc, time::Duration};

use crate::config::ClientConfig;

/// Binding lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A binding was created.
    Connected,
    /// A binding was closed.
    Closed,
    /// Binding creation failed.
    Failed,
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Closed => write!(f, "closed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Direction of a payload measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadDirection {
    /// Encoded request body.
    Sent,
    /// Raw response body.
    Received,
}

impl PayloadDirection {
    fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Received => "received",
        }
    }
}

/// Sink for client-side metrics.
///
/// Every method has an empty default, so implementors override only what
/// they collect. A single instance is shared across clones of a client and
/// across dispatched tasks, hence `Send + Sync`.
pub trait SdkMetrics: Send + Sync + fmt::Debug {
    /// Records a finished call.
    ///
    /// Called once per top-level call, after the retry loop resolves.
    /// `outcome` is `"success"` or the failing error's
    /// [`error_type`](crate::SdkError::error_type).
    fn record_request(&self, operation: &str, duration: Duration, outcome: &str) {
        let _ = (operation, duration, outcome);
    }

    /// Records a re-attempt. `attempt` is the number of the attempt about to
    /// start (2 for the first retry).
    fn record_retry(&self, operation: &str, attempt: u32, error_type: &str) {
        let _ = (operation, attempt, error_type);
    }

    /// Records the size of an encoded request or a received response body.
    fn record_payload(&self, operation: &str, direction: PayloadDirection, bytes: usize) {
        let _ = (operation, direction, bytes);
    }

    /// Records a binding lifecycle event.
    fn record_connection(&self, target: &str, event: ConnectionEvent) {
        let _ = (target, event);
    }
}

/// Metrics sink that discards everything.
#[derive(Debug, Clone, Copy)]
pub struct NoopSdkMetrics;

impl SdkMetrics for NoopSdkMetrics {}

/// Metrics sink backed by the `metrics` crate facade.
///
/// Without an installed recorder every call is a no-op.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSdkMetrics;

mod metric_names {
    pub const REQUESTS_TOTAL: &str = "relaykit_sdk_requests_total";
    pub const REQUEST_DURATION: &str = "relaykit_sdk_request_duration_seconds";
    pub const RETRIES_TOTAL: &str = "relaykit_sdk_retries_total";
    pub const PAYLOAD_BYTES: &str = "relaykit_sdk_payload_bytes";
    pub const CONNECTIONS_TOTAL: &str = "relaykit_sdk_connections_total";
}

impl SdkMetrics for MetricsSdkMetrics {
    fn record_request(&self, operation: &str, duration: Duration, outcome: &str) {
        metrics::counter!(
            metric_names::REQUESTS_TOTAL,
            "operation" => operation.to_owned(),
            "outcome" => outcome.to_owned(),
        )
        .increment(1);
        metrics::histogram!(metric_names::REQUEST_DURATION, "operation" => operation.to_owned())
            .record(duration.as_secs_f64());
    }

    fn record_retry(&self, operation: &str, attempt: u32, error_type: &str) {
        metrics::counter!(
            metric_names::RETRIES_TOTAL,
            "operation" => operation.to_owned(),
            "attempt" => attempt.to_string(),
            "error_type" => error_type.to_owned(),
        )
        .increment(1);
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_payload(&self, operation: &str, direction: PayloadDirection, bytes: usize) {
        metrics::histogram!(
            metric_names::PAYLOAD_BYTES,
            "operation" => operation.to_owned(),
            "direction" => direction.as_str(),
        )
        .record(bytes as f64);
    }

    fn record_connection(&self, target: &str, event: ConnectionEvent) {
        metrics::counter!(
            metric_names::CONNECTIONS_TOTAL,
            "target" => target.to_owned(),
            "event" => event.to_string(),
        )
        .increment(1);
    }
}

/// Picks the sink for a client.
///
/// An explicit sink from [`ClientConfig::with_metrics`] always wins.
/// Otherwise the facade sink is used while telemetry is enabled.
pub(crate) fn metrics_for(config: &ClientConfig) -> Arc<dyn SdkMetrics> {
    match config.metrics() {
        Some(explicit) => Arc::clone(explicit),
        None if config.telemetry().enabled => Arc::new(MetricsSdkMetrics),
        None => Arc::new(NoopSdkMetrics),
    }
}
