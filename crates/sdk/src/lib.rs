//! Request execution core for generated API client SDKs.
//!
//! Generated REST, gRPC and GraphQL clients are thin layers of operation
//! descriptors over this crate. Everything between "call this operation with
//! this body" and "here is the decoded response" lives here: configuration,
//! transport bindings, header assembly, timeouts, bounded retry, background
//! dispatch and the JSON model codec.
//!
//! # Quick Start
//!
//! ```no_run
//! use relaykit_sdk::{CallContext, ClientConfig, OperationDescriptor, RestClient};
//!
//! # async fn example() -> relaykit_sdk::Result<()> {
//! let config = ClientConfig::new("https://petstore.example.com/v1")
//!     .with_header("X-Api-Key", "secret")
//!     .with_retry(3, std::time::Duration::from_millis(200));
//! let client = RestClient::connect(config)?;
//!
//! let descriptor = OperationDescriptor::get("listPets", "/pets").with_query("limit", 10);
//! let pets: Vec<serde_json::Value> = client.call(&CallContext::new(), &descriptor).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        RestClient │ GraphQlClient │ GrpcClient              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   ApiClient (call / call_async)             │
//! │   Retry loop │ Request metrics │ AsyncDispatcher            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   RequestExecutor                           │
//! │   Path expansion │ Headers │ Trace context │ Timeout        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   Transport                                 │
//! │   HttpBinding (reqwest) │ GrpcBinding (tonic) │ Mock        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod clients;
mod codec;
mod config;
mod context;
mod descriptor;
mod dispatch;
mod error;
mod executor;
mod metrics;
pub mod mock;
mod retry;
mod trace_context;
mod transport;

// Public API exports
pub use client::ApiClient;
pub use clients::{
    GraphQlClient, GraphQlError, GraphQlLocation, GraphQlRequest, GraphQlResponse, GrpcClient,
    RestClient,
};
pub use codec::{AdditionalProperties, Model, Schema, decode, encode};
pub use config::{
    ClientConfig, GraphQlOptions, GrpcOptions, KeepAliveConfig, RetryPolicy, TelemetryConfig,
    TlsConfig,
};
pub use context::CallContext;
pub use descriptor::OperationDescriptor;
pub use dispatch::{AsyncDispatcher, AsyncHandle};
pub use error::{CancelReason, RemoteStatus, Result, SdkError};
pub use executor::RequestExecutor;
pub use metrics::{
    ConnectionEvent, MetricsSdkMetrics, NoopSdkMetrics, PayloadDirection, SdkMetrics,
};
pub use retry::with_retry;
pub use trace_context::{TRACEPARENT_HEADER, TRACESTATE_HEADER, TraceContext};
pub use transport::{
    GrpcBinding, HttpBinding, RawResponse, ResponseStatus, Transport, TransportKind,
    TransportRequest,
};
