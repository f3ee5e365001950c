//! Protocol-independent call surface.
//!
//! [`ApiClient`] owns one transport binding and runs every call through the
//! same pipeline: build the request, send it with a timeout, retry transient
//! failures, decode the body. Generated service clients wrap it and add only
//! their operation descriptors.

use std::{future::Future, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use tokio::time::Instant;

use crate::{
    config::ClientConfig,
    context::CallContext,
    descriptor::OperationDescriptor,
    dispatch::{AsyncDispatcher, AsyncHandle},
    error::{InternalSnafu, Result, SdkError},
    executor::RequestExecutor,
    metrics::{ConnectionEvent, SdkMetrics, metrics_for},
    retry::with_retry,
    transport::{GrpcBinding, HttpBinding, RawResponse, Transport},
};

/// Shared call surface for REST, GraphQL and gRPC clients.
///
/// Cloning is cheap: clones share the configuration, the transport binding
/// and its connection pool, so one client can serve many tasks at once.
///
/// # Example
///
/// ```no_run
/// use relaykit_sdk::{ApiClient, CallContext, ClientConfig, OperationDescriptor};
///
/// # async fn example() -> relaykit_sdk::Result<()> {
/// let client = ApiClient::connect_http(ClientConfig::new("https://petstore.example.com/v1"))?;
///
/// let pet: serde_json::Value = client
///     .call(&CallContext::new(), &OperationDescriptor::get("getPet", "/pets/{id}").with_path_param("id", 7))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug, Clone)]
struct ClientInner {
    config: Arc<ClientConfig>,
    executor: RequestExecutor,
    metrics: Arc<dyn SdkMetrics>,
    dispatcher: Option<AsyncDispatcher>,
}

impl ApiClient {
    /// Creates a client over an already bound transport.
    ///
    /// Background calls run on the tokio runtime current at construction
    /// time, or at dispatch time if there was none.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let metrics = metrics_for(&config);
        let config = Arc::new(config);
        let executor =
            RequestExecutor::new(Arc::clone(&config), transport, Arc::clone(&metrics));

        Self {
            inner: Arc::new(ClientInner {
                config,
                executor,
                metrics,
                dispatcher: AsyncDispatcher::try_current(),
            }),
        }
    }

    /// Binds an HTTP transport for a REST target.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Connection`](crate::SdkError::Connection) if the
    /// target or TLS settings are unusable.
    pub fn connect_http(config: ClientConfig) -> Result<Self> {
        let binding = HttpBinding::bind(&config).map(Arc::new);
        Self::from_binding(config, binding)
    }

    /// Connects a gRPC transport.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Connection`](crate::SdkError::Connection) if the
    /// target cannot be reached within the connect timeout.
    pub async fn connect_grpc(config: ClientConfig) -> Result<Self> {
        let binding = GrpcBinding::bind(&config).await.map(Arc::new);
        Self::from_binding(config, binding)
    }

    /// Wraps the outcome of a bind, recording the connection event.
    pub(crate) fn from_binding<T: Transport + 'static>(
        config: ClientConfig,
        binding: Result<Arc<T>>,
    ) -> Result<Self> {
        match binding {
            Ok(transport) => Ok(Self::bound(config, transport)),
            Err(err) => Err(Self::bind_failed(&config, err)),
        }
    }

    /// Creates a client over a freshly bound transport.
    pub(crate) fn bound(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let target = config.target().to_owned();
        let client = Self::with_transport(config, transport);
        client.inner.metrics.record_connection(&target, ConnectionEvent::Connected);
        tracing::debug!(%target, kind = %client.transport().kind(), "client ready");
        client
    }

    /// Records a failed bind and hands the error back.
    pub(crate) fn bind_failed(config: &ClientConfig, err: SdkError) -> SdkError {
        let target = config.target();
        metrics_for(config).record_connection(target, ConnectionEvent::Failed);
        tracing::warn!(%target, error = %err, "failed to bind transport");
        err
    }

    /// Runs background calls on the given dispatcher.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: AsyncDispatcher) -> Self {
        Arc::make_mut(&mut self.inner).dispatcher = Some(dispatcher);
        self
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the bound transport.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        self.inner.executor.transport()
    }

    /// Runs an operation and decodes its response body.
    ///
    /// Transient failures are retried per the configured
    /// [`RetryPolicy`](crate::RetryPolicy); the context bounds the whole call,
    /// delays included.
    ///
    /// # Errors
    ///
    /// - [`SdkError::RequestBuild`](crate::SdkError::RequestBuild) if the
    ///   request cannot be built; nothing is sent.
    /// - [`SdkError::Cancelled`](crate::SdkError::Cancelled) if the context
    ///   is cancelled or a deadline passes.
    /// - [`SdkError::Remote`](crate::SdkError::Remote) for a permanent error
    ///   status.
    /// - [`SdkError::RetryExhausted`](crate::SdkError::RetryExhausted) once
    ///   the retry budget is spent.
    /// - [`SdkError::Decode`](crate::SdkError::Decode) if the body does not
    ///   match `T`.
    /// - [`SdkError::Closed`](crate::SdkError::Closed) after [`close`](Self::close).
    pub async fn call<B, T>(&self, ctx: &CallContext, descriptor: &OperationDescriptor<B>) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        self.call_with(ctx, descriptor, |raw| raw.decode()).await
    }

    /// Runs an operation and returns the raw response.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call), without decode errors.
    pub async fn call_raw<B: Serialize>(
        &self,
        ctx: &CallContext,
        descriptor: &OperationDescriptor<B>,
    ) -> Result<RawResponse> {
        self.call_with(ctx, descriptor, Ok).await
    }

    /// Runs an operation, interpreting each response with `interpret`.
    ///
    /// `interpret` runs inside the retry loop, so an error it returns is
    /// retried when [`is_retryable`](crate::SdkError::is_retryable) says so.
    pub(crate) async fn call_with<B, T, F>(
        &self,
        ctx: &CallContext,
        descriptor: &OperationDescriptor<B>,
        interpret: F,
    ) -> Result<T>
    where
        B: Serialize,
        F: Fn(RawResponse) -> Result<T>,
    {
        let inner = &self.inner;
        let started = Instant::now();

        let result = with_retry(
            inner.config.retry_policy(),
            ctx,
            inner.metrics.as_ref(),
            descriptor.name(),
            || async { interpret(inner.executor.execute(ctx, descriptor).await?) },
        )
        .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => {
                tracing::debug!(operation = descriptor.name(), error = %err, "call failed");
                err.error_type()
            },
        };
        inner.metrics.record_request(descriptor.name(), started.elapsed(), outcome);
        result
    }

    /// Runs an operation on a background task.
    ///
    /// Returns immediately. The handle yields exactly one result; cancelling
    /// `ctx` makes it yield [`SdkError::Cancelled`](crate::SdkError::Cancelled).
    pub fn call_async<B, T>(&self, ctx: CallContext, descriptor: OperationDescriptor<B>) -> AsyncHandle<T>
    where
        B: Serialize + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
    {
        let client = self.clone();
        let task_ctx = ctx.clone();
        self.dispatch(ctx, async move { client.call(&task_ctx, &descriptor).await })
    }

    /// Runs `call` on the client's dispatcher.
    ///
    /// Generated clients use this for operations composed of more than one
    /// [`call`](Self::call). The handle behaves as for [`call_async`](Self::call_async).
    pub fn dispatch<T, F>(&self, ctx: CallContext, call: F) -> AsyncHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        match self.inner.dispatcher.clone().or_else(AsyncDispatcher::try_current) {
            Some(dispatcher) => dispatcher.dispatch(ctx, call),
            None => AsyncHandle::ready(
                InternalSnafu { message: "no tokio runtime available for a background call" }
                    .fail(),
            ),
        }
    }

    /// Releases the transport binding.
    ///
    /// Idempotent. Calls issued afterwards fail with
    /// [`SdkError::Closed`](crate::SdkError::Closed).
    pub fn close(&self) {
        if self.transport().close() {
            self.inner.metrics.record_connection(self.config().target(), ConnectionEvent::Closed);
        }
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.transport().is_closed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    };

    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::{
        error::{CancelReason, RemoteStatus},
        mock::MockTransport,
    };

    #[derive(Debug, Default)]
    struct RecordingMetrics {
        outcomes: Mutex<Vec<(String, String)>>,
        retries: AtomicU64,
        connections: Mutex<Vec<ConnectionEvent>>,
    }

    impl SdkMetrics for RecordingMetrics {
        fn record_request(&self, operation: &str, _duration: Duration, outcome: &str) {
            self.outcomes.lock().push((operation.to_owned(), outcome.to_owned()));
        }

        fn record_retry(&self, _operation: &str, _attempt: u32, _error_type: &str) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        fn record_connection(&self, _target: &str, event: ConnectionEvent) {
            self.connections.lock().push(event);
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pet {
        id: u64,
        name: String,
    }

    fn setup() -> (ApiClient, Arc<MockTransport>, Arc<RecordingMetrics>) {
        let mock = Arc::new(MockTransport::new());
        let metrics = Arc::new(RecordingMetrics::default());
        let config = ClientConfig::new("http://mock.local")
            .with_retry(3, Duration::from_millis(10))
            .with_metrics(metrics.clone());
        (ApiClient::with_transport(config, mock.clone()), mock, metrics)
    }

    #[tokio::test]
    async fn test_call_decodes_body() {
        let (client, mock, metrics) = setup();
        mock.respond_json(200, &json!({"id": 7, "name": "Rex"}));

        let pet: Pet = client
            .call(&CallContext::new(), &OperationDescriptor::get("getPet", "/pets/{id}").with_path_param("id", 7))
            .await
            .unwrap();

        assert_eq!(pet, Pet { id: 7, name: "Rex".to_owned() });
        assert_eq!(mock.last_request().unwrap().target, "http://mock.local/pets/7");
        assert_eq!(
            metrics.outcomes.lock().as_slice(),
            &[("getPet".to_owned(), "success".to_owned())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let (client, mock, metrics) = setup();
        mock.respond(503, "busy");
        mock.fail_transport("reset");
        mock.respond(500, "oops");
        mock.respond_json(200, &json!({"id": 1, "name": "Tom"}));

        let pet: Pet =
            client.call(&CallContext::new(), &OperationDescriptor::get("getPet", "/pets/1")).await.unwrap();

        assert_eq!(pet.id, 1);
        assert_eq!(mock.request_count(), 4);
        assert_eq!(metrics.retries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_reports_last_status() {
        let (client, mock, metrics) = setup();
        mock.set_default_reply(crate::mock::MockReply::http(503, "down"));

        let err = client
            .call::<(), Pet>(&CallContext::new(), &OperationDescriptor::get("getPet", "/pets/1"))
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), Some(4));
        assert_eq!(err.status(), Some(&RemoteStatus::Http(503)));
        assert_eq!(mock.request_count(), 4);
        assert_eq!(metrics.outcomes.lock()[0].1, "retry_exhausted");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (client, mock, _) = setup();
        mock.respond(404, r#"{"message":"no such pet"}"#);

        let err = client
            .call::<(), Pet>(&CallContext::new(), &OperationDescriptor::get("getPet", "/pets/9"))
            .await
            .unwrap_err();

        match err {
            SdkError::Remote { status: RemoteStatus::Http(404), body } => {
                assert!(body.contains("no such pet"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_decode_error_is_not_retried() {
        let (client, mock, metrics) = setup();
        mock.respond(200, "not json");

        let err = client
            .call::<(), Pet>(&CallContext::new(), &OperationDescriptor::get("getPet", "/pets/1"))
            .await
            .unwrap_err();

        assert!(matches!(err, SdkError::Decode { .. }));
        assert_eq!(mock.request_count(), 1);
        assert_eq!(metrics.outcomes.lock()[0].1, "decode");
    }

    #[tokio::test]
    async fn test_call_raw_returns_body() {
        let (client, mock, _) = setup();
        mock.respond(202, "accepted");

        let raw = client
            .call_raw(&CallContext::new(), &OperationDescriptor::post("start", "/jobs").with_body(json!({"a": 1})))
            .await
            .unwrap();

        assert_eq!(raw.text(), "accepted");
        assert_eq!(&mock.last_request().unwrap().body.unwrap()[..], br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_request_build_error_sends_nothing() {
        let (client, mock, _) = setup();

        let err = client
            .call::<(), Pet>(&CallContext::new(), &OperationDescriptor::get("getPet", "/pets/{id}"))
            .await
            .unwrap_err();

        assert!(matches!(err, SdkError::RequestBuild { .. }));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_whole_call() {
        let (client, mock, _) = setup();
        mock.inject_delay(Duration::from_secs(10));
        let ctx = CallContext::new().with_timeout(Duration::from_millis(50));

        let err = client
            .call::<(), Pet>(&ctx, &OperationDescriptor::get("getPet", "/pets/1"))
            .await
            .unwrap_err();

        assert!(matches!(err, SdkError::Cancelled { reason: CancelReason::Deadline(_) }));
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_call_async_delivers_result() {
        let (client, mock, _) = setup();
        mock.respond_json(200, &json!({"id": 3, "name": "Kit"}));

        let handle: AsyncHandle<Pet> =
            client.call_async(CallContext::new(), OperationDescriptor::get("getPet", "/pets/3"));

        assert_eq!(handle.await.unwrap().name, "Kit");
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_async_cancellation() {
        let (client, mock, _) = setup();
        mock.inject_delay(Duration::from_secs(60));
        let ctx = CallContext::new();

        let handle: AsyncHandle<Pet> =
            client.call_async(ctx.clone(), OperationDescriptor::get("getPet", "/pets/3"));
        tokio::time::sleep(Duration::from_millis(5)).await;
        ctx.cancel();

        assert!(matches!(
            handle.await,
            Err(SdkError::Cancelled { reason: CancelReason::Caller })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_client() {
        let (client, mock, _) = setup();

        let calls = (0..16).map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .call_raw(&CallContext::new(), &OperationDescriptor::get("ping", format!("/ping/{i}")))
                    .await
            })
        });
        for call in futures::future::join_all(calls).await {
            call.unwrap().unwrap();
        }

        assert_eq!(mock.request_count(), 16);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_rejects_calls() {
        let (client, mock, metrics) = setup();

        client.close();
        client.close();

        assert!(client.is_closed());
        let err = client
            .call_raw(&CallContext::new(), &OperationDescriptor::get("ping", "/ping"))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Closed));
        assert_eq!(mock.request_count(), 0);
        assert_eq!(metrics.connections.lock().as_slice(), &[ConnectionEvent::Closed]);
    }

    #[test]
    fn test_concurrent_close_records_one_event() {
        let (client, _mock, metrics) = setup();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let client = client.clone();
                scope.spawn(move || client.close());
            }
        });

        assert!(client.is_closed());
        assert_eq!(metrics.connections.lock().as_slice(), &[ConnectionEvent::Closed]);
    }

    #[test]
    fn test_bind_failure_is_reported() {
        let metrics = Arc::new(RecordingMetrics::default());
        let config = ClientConfig::new("ftp://nowhere").with_metrics(metrics.clone());

        let err = ApiClient::connect_http(config).unwrap_err();

        assert!(matches!(err, SdkError::Connection { .. }));
        assert_eq!(metrics.connections.lock().as_slice(), &[ConnectionEvent::Failed]);
    }

    #[test]
    fn test_bind_success_is_reported() {
        let metrics = Arc::new(RecordingMetrics::default());
        let config = ClientConfig::new("http://127.0.0.1:9").with_metrics(metrics.clone());

        let client = ApiClient::connect_http(config).unwrap();

        assert_eq!(client.transport().kind(), crate::transport::TransportKind::Http);
        assert_eq!(metrics.connections.lock().as_slice(), &[ConnectionEvent::Connected]);
    }

    #[test]
    fn test_call_async_without_runtime_reports_internal() {
        let client =
            ApiClient::with_transport(ClientConfig::new("http://mock.local"), Arc::new(MockTransport::new()));

        let mut handle: AsyncHandle<Pet> =
            client.call_async(CallContext::new(), OperationDescriptor::get("getPet", "/pets/1"));

        assert!(matches!(handle.try_recv(), Some(Err(SdkError::Internal { .. }))));
    }
}
