//! Transport bindings.
//!
//! A binding owns the connection state for one client and turns a fully built
//! [`TransportRequest`] into a [`RawResponse`]. Bindings are shared as
//! `Arc<dyn Transport>`; every implementation is safe for concurrent use.
//!
//! - [`HttpBinding`]: pooled `reqwest` client for REST and GraphQL targets.
//! - [`GrpcBinding`]: `tonic` channel carrying JSON payloads for unary RPCs.
//! - [`MockTransport`](crate::mock::MockTransport): scripted in-process binding for tests.

mod grpc;
mod http;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use tonic::Code;
use url::Url;

pub use self::{grpc::GrpcBinding, http::HttpBinding};
use crate::{
    codec,
    error::{ConnectionSnafu, RequestBuildSnafu, Result},
};

/// Protocol family served by a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// JSON over HTTP.
    Http,
    /// GraphQL documents over HTTP.
    GraphQl,
    /// Unary gRPC with JSON payloads.
    Grpc,
}

impl TransportKind {
    /// Returns true for bindings that speak HTTP/JSON and take the fixed
    /// `Content-Type` / `Accept` pair.
    #[must_use]
    pub fn is_http(self) -> bool {
        matches!(self, Self::Http | Self::GraphQl)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::GraphQl => write!(f, "graphql"),
            Self::Grpc => write!(f, "grpc"),
        }
    }
}

/// One fully built request, ready for the wire.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Operation name, for logs.
    pub operation: String,
    /// HTTP method; bindings that have no method ignore it.
    pub method: ::http::Method,
    /// Absolute URL (HTTP) or `/package.Service/Method` path (gRPC).
    pub target: String,
    /// Final header set.
    pub headers: ::http::HeaderMap,
    /// Encoded body.
    pub body: Option<Bytes>,
}

/// Outcome status reported by a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// HTTP status code.
    Http(u16),
    /// gRPC status code.
    Grpc(Code),
}

impl ResponseStatus {
    /// Returns true for 2xx HTTP statuses and gRPC `OK`.
    #[must_use]
    pub fn is_success(self) -> bool {
        match self {
            Self::Http(status) => (200..300).contains(&status),
            Self::Grpc(code) => code == Code::Ok,
        }
    }
}

/// Response as received from the wire.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Status reported by the remote side.
    pub status: ResponseStatus,
    /// Response headers or gRPC metadata.
    pub headers: ::http::HeaderMap,
    /// Raw body; for gRPC errors, the status message.
    pub body: Bytes,
}

impl RawResponse {
    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Decode`](crate::SdkError::Decode) on a body that
    /// does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        codec::decode(&self.body)
    }

    /// Returns the body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A connection to a remote service.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Returns the protocol family of this binding.
    fn kind(&self) -> TransportKind;

    /// Builds the wire target for an expanded path and its query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::RequestBuild`](crate::SdkError::RequestBuild) if
    /// the path or query cannot be expressed on this transport.
    fn resolve(&self, path: &str, query: &[(&str, &str)]) -> Result<String>;

    /// Sends one request and waits for its response.
    ///
    /// A non-success status is returned as a response, not an error. Errors
    /// are reserved for failures that produced no response at all.
    async fn send(&self, request: TransportRequest) -> Result<RawResponse>;

    /// Releases the underlying connection. Later calls return
    /// [`SdkError::Closed`](crate::SdkError::Closed).
    ///
    /// Returns true only for the call that actually released it; closing
    /// again, or concurrently, returns false.
    fn close(&self) -> bool {
        false
    }

    /// Returns true once [`close`](Self::close) has run.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Parses an HTTP(S) base URL.
pub(crate) fn parse_base_url(target: &str) -> Result<Url> {
    let url = Url::parse(target).map_err(|e| {
        ConnectionSnafu { message: format!("invalid target URL {target:?}: {e}") }.build()
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => ConnectionSnafu {
            message: format!("unsupported scheme {other:?} in target {target:?}"),
        }
        .fail(),
    }
}

/// Joins `base` and `path` with exactly one `/` and appends the query pairs.
///
/// Query pairs use `application/x-www-form-urlencoded` encoding. Any query
/// already present on the base URL is kept.
pub(crate) fn resolve_url(base: &Url, path: &str, query: &[(&str, &str)]) -> Result<String> {
    let mut joined = base.as_str().trim_end_matches('/').to_owned();
    if base.query().is_some() || base.fragment().is_some() {
        let mut stripped = base.clone();
        stripped.set_query(None);
        stripped.set_fragment(None);
        joined = stripped.as_str().trim_end_matches('/').to_owned();
    }
    let path = path.trim_start_matches('/');
    if !path.is_empty() {
        joined.push('/');
        joined.push_str(path);
    }

    let mut url = Url::parse(&joined).map_err(|e| {
        RequestBuildSnafu { message: format!("invalid request URL {joined:?}: {e}") }.build()
    })?;
    if let Some(existing) = base.query() {
        url.set_query(Some(existing));
    }
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url.into())
}
