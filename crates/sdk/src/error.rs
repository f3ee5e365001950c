//! SDK error types with retry classification.
//!
//! Provides a layered error model:
//! - **Local errors**: configuration, request building, response decoding
//! - **Transport errors**: connection setup and network-level failures
//! - **Remote errors**: the service answered with an error status
//! - **Terminal wrappers**: cancellation and exhausted retry budgets
//!
//! Every variant carries enough context (status, cause, attempt count) to tell
//! a local bug apart from a remote or transient condition.

use std::{fmt, time::Duration};

use snafu::{Location, Snafu};
use tonic::Code;

use crate::clients::GraphQlError;

/// Boxed error used for transport failures coming from different stacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Why a call stopped before producing a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller cancelled the call's context.
    Caller,
    /// The configured timeout or the context deadline elapsed.
    Deadline(Duration),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller => write!(f, "cancelled by caller"),
            Self::Deadline(after) => write!(f, "deadline exceeded after {}ms", after.as_millis()),
        }
    }
}

/// Status reported by a remote service that answered with an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteStatus {
    /// HTTP status code outside the 2xx range.
    Http(u16),
    /// gRPC status code other than `OK`.
    Grpc(Code),
    /// GraphQL `errors` list returned with the response.
    GraphQl(Vec<GraphQlError>),
}

/// GraphQL `extensions.code` values treated as transient.
const TRANSIENT_GRAPHQL_CODES: &[&str] =
    &["UNAVAILABLE", "SERVICE_UNAVAILABLE", "RESOURCE_EXHAUSTED", "RATE_LIMITED"];

impl RemoteStatus {
    /// Returns true if the status indicates a temporary condition.
    ///
    /// Transient statuses:
    /// - HTTP: any 5xx, and `429 Too Many Requests`
    /// - gRPC: `UNAVAILABLE`, `RESOURCE_EXHAUSTED`, `ABORTED`, `DEADLINE_EXCEEDED`, `INTERNAL`
    /// - GraphQL: any error whose `extensions.code` is a transient code
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(status) => *status == 429 || (500..=599).contains(status),
            Self::Grpc(code) => matches!(
                code,
                Code::Unavailable
                    | Code::ResourceExhausted
                    | Code::Aborted
                    | Code::DeadlineExceeded
                    | Code::Internal
            ),
            Self::GraphQl(errors) => errors
                .iter()
                .filter_map(GraphQlError::code)
                .any(|code| TRANSIENT_GRAPHQL_CODES.contains(&code)),
        }
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(status) => write!(f, "HTTP {status}"),
            Self::Grpc(code) => write!(f, "gRPC {code:?}"),
            Self::GraphQl(errors) => {
                let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
                write!(f, "GraphQL errors: {}", messages.join("; "))
            },
        }
    }
}

/// SDK error types with context-rich error messages.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SdkError {
    /// Failed to establish a transport binding (bad target, unreachable, TLS setup).
    #[snafu(display("Connection error at {location}: {message}"))]
    Connection {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Configuration could not be loaded.
    #[snafu(display("Configuration error: {message}"))]
    Config {
        /// Error description.
        message: String,
    },

    /// Request could not be built locally; no I/O was attempted.
    #[snafu(display("Request build error: {message}"))]
    RequestBuild {
        /// Error description.
        message: String,
    },

    /// Call stopped because its context was cancelled or its deadline fired.
    #[snafu(display("Call {reason}"))]
    Cancelled {
        /// Cancellation cause.
        reason: CancelReason,
    },

    /// Network-level failure (refused connection, DNS, broken pipe).
    #[snafu(display("Transport error at {location}: {source}"))]
    Transport {
        /// Underlying transport error.
        source: BoxError,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Remote service answered with an error status.
    #[snafu(display("Remote error ({status}): {body}"))]
    Remote {
        /// Status reported by the service.
        status: RemoteStatus,
        /// Raw response body or status detail, for diagnostics.
        body: String,
    },

    /// Response body did not match the expected type.
    #[snafu(display("Decode error: {message}"))]
    Decode {
        /// Error description.
        message: String,
    },

    /// Retry budget spent; wraps the last failure.
    #[snafu(display("Retry exhausted after {attempts} attempts: {source}"))]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Failure observed on the last attempt.
        source: Box<SdkError>,
    },

    /// The transport binding was closed before the call was issued.
    #[snafu(display("Transport binding is closed"))]
    Closed,

    /// A dispatched call ended without producing a result of its own.
    #[snafu(display("Internal error: {message}"))]
    Internal {
        /// Error description.
        message: String,
    },
}

impl SdkError {
    /// Returns true if the error is transient and the operation may be retried.
    ///
    /// Retryable errors:
    /// - `Transport`: network issues
    /// - `Remote` with a transient status (see [`RemoteStatus::is_transient`])
    ///
    /// Everything else aborts the retry loop immediately: client errors (4xx),
    /// request build and decode failures, cancellation, closed bindings and
    /// exhausted budgets.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Remote { status, .. } => status.is_transient(),
            Self::Connection { .. }
            | Self::Config { .. }
            | Self::RequestBuild { .. }
            | Self::Cancelled { .. }
            | Self::Decode { .. }
            | Self::RetryExhausted { .. }
            | Self::Closed
            | Self::Internal { .. } => false,
        }
    }

    /// Returns the remote status, looking through an exhausted retry wrapper.
    #[must_use]
    pub fn status(&self) -> Option<&RemoteStatus> {
        match self {
            Self::Remote { status, .. } => Some(status),
            Self::RetryExhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Returns the number of attempts recorded by an exhausted retry loop.
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RetryExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Returns true if the call was cancelled or hit its deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns a short, stable label used for metrics and logs.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Config { .. } => "config",
            Self::RequestBuild { .. } => "request_build",
            Self::Cancelled { .. } => "cancelled",
            Self::Transport { .. } => "transport",
            Self::Remote { status, .. } => match status {
                RemoteStatus::Http(_) => "remote_http",
                RemoteStatus::Grpc(_) => "remote_grpc",
                RemoteStatus::GraphQl(_) => "remote_graphql",
            },
            Self::Decode { .. } => "decode",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::Closed => "closed",
            Self::Internal { .. } => "internal",
        }
    }

    /// Wraps any network-level error as [`SdkError::Transport`].
    #[track_caller]
    pub(crate) fn transport(source: impl Into<BoxError>) -> Self {
        Self::Transport { source: source.into(), location: Location::default() }
    }
}

impl From<reqwest::Error> for SdkError {
    #[track_caller]
    fn from(source: reqwest::Error) -> Self {
        Self::transport(source)
    }
}

impl From<tonic::transport::Error> for SdkError {
    #[track_caller]
    fn from(source: tonic::transport::Error) -> Self {
        Self::transport(source)
    }
}
