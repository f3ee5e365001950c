//! Scripted in-process transport for tests and benchmarks.
//!
//! [`MockTransport`] implements [`Transport`] without any I/O. Replies are
//! taken from a FIFO script; once the script is empty every call gets the
//! default reply (`200` with an empty JSON object).
//!
//! # Features
//!
//! - **Scripted replies**: queue responses or transport failures in order
//! - **Failure injection**: fail the next N calls with a transient error
//! - **Latency injection**: delay every call
//! - **Request capture**: inspect everything the executor sent
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use relaykit_sdk::{ApiClient, CallContext, ClientConfig, OperationDescriptor, mock::MockTransport};
//!
//! # async fn example() -> relaykit_sdk::Result<()> {
//! let transport = Arc::new(MockTransport::new());
//! transport.respond_json(200, &serde_json::json!({"id": 1}));
//!
//! let client = ApiClient::with_transport(ClientConfig::new("http://mock.local"), transport.clone());
//! let value: serde_json::Value =
//!     client.call(&CallContext::new(), &OperationDescriptor::get("getPet", "/pets/1")).await?;
//!
//! assert_eq!(value["id"], 1);
//! assert_eq!(transport.request_count(), 1);
//! # Ok(())
//! # }
//! ```

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tonic::Code;
use url::Url;

use crate::{
    error::{ClosedSnafu, RequestBuildSnafu, Result, SdkError},
    transport::{RawResponse, ResponseStatus, Transport, TransportKind, TransportRequest, resolve_url},
};

/// Base URL the mock resolves HTTP paths against.
const MOCK_BASE_URL: &str = "http://mock.local/";

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Reply with this response.
    Response(RawResponse),
    /// Fail with a transport error carrying this message.
    TransportError(String),
}

impl MockReply {
    /// Builds a reply with the given HTTP status and body.
    #[must_use]
    pub fn http(status: u16, body: impl Into<Bytes>) -> Self {
        Self::Response(RawResponse {
            status: ResponseStatus::Http(status),
            headers: ::http::HeaderMap::new(),
            body: body.into(),
        })
    }

    /// Builds a reply with the given gRPC code and body.
    #[must_use]
    pub fn grpc(code: Code, body: impl Into<Bytes>) -> Self {
        Self::Response(RawResponse {
            status: ResponseStatus::Grpc(code),
            headers: ::http::HeaderMap::new(),
            body: body.into(),
        })
    }
}

/// In-process [`Transport`] with scripted replies.
#[derive(Debug)]
pub struct MockTransport {
    kind: TransportKind,
    base: Url,
    script: Mutex<VecDeque<MockReply>>,
    default_reply: Mutex<MockReply>,
    requests: Mutex<Vec<TransportRequest>>,
    injected_failures: AtomicUsize,
    delay_ms: AtomicU64,
    request_count: AtomicUsize,
    closed: AtomicBool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates an HTTP mock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_kind(TransportKind::Http)
    }

    /// Creates a mock that reports the given transport kind.
    ///
    /// gRPC mocks answer with `OK` by default and reject query parameters.
    #[must_use]
    pub fn with_kind(kind: TransportKind) -> Self {
        let default_reply = match kind {
            TransportKind::Grpc => MockReply::grpc(Code::Ok, Bytes::from_static(b"{}")),
            TransportKind::Http | TransportKind::GraphQl => {
                MockReply::http(200, Bytes::from_static(b"{}"))
            },
        };
        Self {
            kind,
            base: Url::parse(MOCK_BASE_URL).unwrap_or_else(|_| unreachable!("static mock URL")),
            script: Mutex::new(VecDeque::new()),
            default_reply: Mutex::new(default_reply),
            requests: Mutex::new(Vec::new()),
            injected_failures: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
            request_count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Appends a reply to the script.
    pub fn push(&self, reply: MockReply) {
        self.script.lock().push_back(reply);
    }

    /// Appends an HTTP reply with a raw body.
    pub fn respond(&self, status: u16, body: impl Into<Bytes>) {
        self.push(MockReply::http(status, body));
    }

    /// Appends an HTTP reply with a JSON body.
    ///
    /// # Panics
    ///
    /// Panics if `body` cannot be serialized; mocks are test-only.
    #[allow(clippy::expect_used)]
    pub fn respond_json<T: Serialize + ?Sized>(&self, status: u16, body: &T) {
        let bytes = serde_json::to_vec(body).expect("mock body must serialize");
        self.respond(status, bytes);
    }

    /// Appends a gRPC reply.
    pub fn respond_grpc(&self, code: Code, body: impl Into<Bytes>) {
        self.push(MockReply::grpc(code, body));
    }

    /// Appends a transport failure.
    pub fn fail_transport(&self, message: impl Into<String>) {
        self.push(MockReply::TransportError(message.into()));
    }

    /// Replaces the reply used once the script is empty.
    pub fn set_default_reply(&self, reply: MockReply) {
        *self.default_reply.lock() = reply;
    }

    /// Fails the next `count` calls with a transport error, ahead of the script.
    pub fn inject_failures(&self, count: usize) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Delays every subsequent call. Zero disables the delay.
    pub fn inject_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Returns the number of calls that reached the mock.
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Returns every request seen so far.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    /// Returns the most recent request.
    pub fn last_request(&self) -> Option<TransportRequest> {
        self.requests.lock().last().cloned()
    }

    /// Clears the script, injections and captured requests.
    pub fn reset(&self) {
        self.script.lock().clear();
        self.requests.lock().clear();
        self.injected_failures.store(0, Ordering::SeqCst);
        self.delay_ms.store(0, Ordering::SeqCst);
        self.request_count.store(0, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn next_reply(&self) -> MockReply {
        match self.script.lock().pop_front() {
            Some(reply) => reply,
            None => self.default_reply.lock().clone(),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn resolve(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
        match self.kind {
            TransportKind::Grpc if !query.is_empty() => RequestBuildSnafu {
                message: format!("gRPC call {path} cannot carry query parameters"),
            }
            .fail(),
            TransportKind::Grpc => Ok(path.to_owned()),
            TransportKind::Http | TransportKind::GraphQl => resolve_url(&self.base, path, query),
        }
    }

    async fn send(&self, request: TransportRequest) -> Result<RawResponse> {
        if self.closed.load(Ordering::SeqCst) {
            return ClosedSnafu.fail();
        }
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);

        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        if self.take_injected_failure() {
            return Err(SdkError::transport(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "injected failure",
            )));
        }

        match self.next_reply() {
            MockReply::Response(response) => Ok(response),
            MockReply::TransportError(message) => {
                Err(SdkError::transport(std::io::Error::other(message)))
            },
        }
    }

    fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn request() -> TransportRequest {
        TransportRequest {
            operation: "op".to_owned(),
            method: ::http::Method::GET,
            target: "http://mock.local/x".to_owned(),
            headers: ::http::HeaderMap::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let mock = MockTransport::new();
        mock.respond(201, "created");

        let first = mock.send(request()).await.unwrap();
        let second = mock.send(request()).await.unwrap();

        assert_eq!(first.status, ResponseStatus::Http(201));
        assert_eq!(first.text(), "created");
        assert_eq!(second.status, ResponseStatus::Http(200));
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures_run_ahead_of_script() {
        let mock = MockTransport::new();
        mock.respond(202, "");
        mock.inject_failures(2);

        assert!(mock.send(request()).await.unwrap_err().is_retryable());
        assert!(mock.send(request()).await.is_err());
        assert_eq!(mock.send(request()).await.unwrap().status, ResponseStatus::Http(202));
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_delay() {
        let mock = MockTransport::new();
        mock.inject_delay(Duration::from_millis(50));

        let start = tokio::time::Instant::now();
        mock.send(request()).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_closed_mock_rejects_calls() {
        let mock = MockTransport::new();
        mock.close();
        assert!(matches!(mock.send(request()).await, Err(SdkError::Closed)));
        assert_eq!(mock.request_count(), 0);

        mock.reset();
        assert!(mock.send(request()).await.is_ok());
    }

    #[test]
    fn test_grpc_mock_resolve() {
        let mock = MockTransport::with_kind(TransportKind::Grpc);
        assert_eq!(mock.resolve("/pkg.Svc/Get", &[]).unwrap(), "/pkg.Svc/Get");
        assert!(mock.resolve("/pkg.Svc/Get", &[("a", "1")]).is_err());
    }

    #[test]
    fn test_http_mock_resolve() {
        let mock = MockTransport::new();
        assert_eq!(mock.resolve("/pets", &[("limit", "2")]).unwrap(), "http://mock.local/pets?limit=2");
    }
}
