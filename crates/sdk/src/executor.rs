//! Single-attempt request execution.
//!
//! The executor turns an [`OperationDescriptor`] into a [`TransportRequest`],
//! issues it on the bound transport and classifies the outcome. It never
//! retries; see [`crate::retry`] for the loop around it.
//!
//! Header precedence, lowest to highest:
//! 1. Default headers from the configuration
//! 2. `User-Agent` (HTTP transports) and trace context (telemetry enabled)
//! 3. Per-operation headers
//! 4. `Content-Type` / `Accept: application/json` (HTTP transports)

use std::{collections::HashMap, sync::Arc};

use http::{
    HeaderMap, HeaderName, HeaderValue,
    header::{ACCEPT, CONTENT_TYPE, USER_AGENT},
};
use serde::Serialize;
use tokio::time::Instant;

use crate::{
    codec,
    config::ClientConfig,
    context::CallContext,
    descriptor::OperationDescriptor,
    error::{CancelReason, CancelledSnafu, RemoteSnafu, RemoteStatus, RequestBuildSnafu, Result},
    metrics::{PayloadDirection, SdkMetrics},
    trace_context::TraceContext,
    transport::{RawResponse, ResponseStatus, Transport, TransportRequest},
};

const APPLICATION_JSON: &str = "application/json";

/// Issues one transport call per [`execute`](Self::execute).
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    metrics: Arc<dyn SdkMetrics>,
}

impl RequestExecutor {
    /// Creates an executor over a bound transport.
    #[must_use]
    pub fn new(
        config: Arc<ClientConfig>,
        transport: Arc<dyn Transport>,
        metrics: Arc<dyn SdkMetrics>,
    ) -> Self {
        Self { config, transport, metrics }
    }

    /// Returns the transport this executor sends on.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Builds and sends one request.
    ///
    /// # Errors
    ///
    /// - [`SdkError::RequestBuild`](crate::SdkError::RequestBuild) for an
    ///   unusable path, body or header; nothing is sent.
    /// - [`SdkError::Cancelled`](crate::SdkError::Cancelled) if the context is
    ///   done before or during the call, or the timeout elapses.
    /// - [`SdkError::Transport`](crate::SdkError::Transport) if no response arrived.
    /// - [`SdkError::Remote`](crate::SdkError::Remote) for a non-success status.
    pub async fn execute<B: Serialize>(
        &self,
        ctx: &CallContext,
        descriptor: &OperationDescriptor<B>,
    ) -> Result<RawResponse> {
        let request = self.prepare(descriptor)?;
        self.send(ctx, request).await
    }

    /// Builds the transport request without sending it.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::RequestBuild`](crate::SdkError::RequestBuild) on
    /// any local failure.
    pub fn prepare<B: Serialize>(
        &self,
        descriptor: &OperationDescriptor<B>,
    ) -> Result<TransportRequest> {
        let path = descriptor.expand_path()?;
        let query: Vec<(&str, &str)> =
            descriptor.query().iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let target = self.transport.resolve(&path, &query)?;

        let body = descriptor.body().map(codec::encode).transpose()?;
        let headers = self.build_headers(descriptor.headers())?;

        Ok(TransportRequest {
            operation: descriptor.name().to_owned(),
            method: descriptor.method().clone(),
            target,
            headers,
            body,
        })
    }

    /// Sends a prepared request, racing the context and the timeout.
    pub(crate) async fn send(
        &self,
        ctx: &CallContext,
        request: TransportRequest,
    ) -> Result<RawResponse> {
        if let Some(reason) = ctx.is_done() {
            return CancelledSnafu { reason }.fail();
        }

        let timeout = match ctx.remaining() {
            Some(remaining) => remaining.min(self.config.timeout()),
            None => self.config.timeout(),
        };
        let operation = request.operation.clone();
        if let Some(body) = &request.body {
            self.metrics.record_payload(&operation, PayloadDirection::Sent, body.len());
        }

        tracing::debug!(
            operation = %operation,
            method = %request.method,
            url = %request.target,
            timeout_ms = timeout.as_millis() as u64,
            "sending request"
        );

        let started = Instant::now();
        let response = tokio::select! {
            biased;
            reason = ctx.done() => {
                let reason = match reason {
                    CancelReason::Deadline(_) => CancelReason::Deadline(started.elapsed()),
                    CancelReason::Caller => CancelReason::Caller,
                };
                tracing::debug!(operation = %operation, %reason, "request cancelled");
                return CancelledSnafu { reason }.fail();
            },
            outcome = tokio::time::timeout(timeout, self.transport.send(request)) => match outcome {
                Ok(result) => result?,
                Err(_) => {
                    tracing::debug!(operation = %operation, timeout_ms = timeout.as_millis() as u64, "request timed out");
                    return CancelledSnafu { reason: CancelReason::Deadline(timeout) }.fail();
                },
            },
        };

        self.metrics.record_payload(&operation, PayloadDirection::Received, response.body.len());
        tracing::debug!(
            operation = %operation,
            status = ?response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "response received"
        );

        if !response.status.is_success() {
            let status = match response.status {
                ResponseStatus::Http(code) => RemoteStatus::Http(code),
                ResponseStatus::Grpc(code) => RemoteStatus::Grpc(code),
            };
            return RemoteSnafu { status, body: response.text() }.fail();
        }

        Ok(response)
    }

    fn build_headers(&self, operation_headers: &HashMap<String, String>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let is_http = self.transport.kind().is_http();

        for (name, value) in self.config.default_headers() {
            insert_header(&mut headers, name, value)?;
        }
        if is_http {
            headers.insert(USER_AGENT, parse_value(USER_AGENT.as_str(), self.config.user_agent())?);
        }
        if self.config.telemetry().enabled {
            TraceContext::current().inject(&mut headers);
        }
        for (name, value) in operation_headers {
            insert_header(&mut headers, name, value)?;
        }
        if is_http {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
            headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
        }

        Ok(headers)
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
        RequestBuildSnafu { message: format!("invalid header name {name:?}: {e}") }.build()
    })?;
    headers.insert(header_name, parse_value(name, value)?);
    Ok(())
}

fn parse_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        RequestBuildSnafu { message: format!("invalid value for header {name:?}: {e}") }.build()
    })
}
