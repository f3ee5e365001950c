//! HTTP binding over a pooled `reqwest` client.

use async_trait::async_trait;
use parking_lot::RwLock;
use url::Url;

use super::{RawResponse, ResponseStatus, Transport, TransportKind, TransportRequest, parse_base_url};
use crate::{
    config::ClientConfig,
    error::{ClosedSnafu, ConnectionSnafu, Result},
};

/// HTTP binding for REST and GraphQL targets.
///
/// The `reqwest` client pools connections internally, so one binding serves
/// any number of concurrent calls. Closing drops the binding's client; calls
/// already holding a clone finish on their own connection.
#[derive(Debug)]
pub struct HttpBinding {
    base: Url,
    kind: TransportKind,
    client: RwLock<Option<reqwest::Client>>,
}

impl HttpBinding {
    /// Creates a binding for a REST target.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Connection`](crate::SdkError::Connection) if the
    /// target is not an `http`/`https` URL, TLS is enabled for a plain
    /// `http://` target, or the CA bundle cannot be loaded.
    pub fn bind(config: &ClientConfig) -> Result<Self> {
        Self::bind_as(config, TransportKind::Http)
    }

    /// Creates a binding for a GraphQL endpoint.
    ///
    /// # Errors
    ///
    /// Same as [`bind`](Self::bind).
    pub fn bind_graphql(config: &ClientConfig) -> Result<Self> {
        Self::bind_as(config, TransportKind::GraphQl)
    }

    fn bind_as(config: &ClientConfig, kind: TransportKind) -> Result<Self> {
        let base = parse_base_url(config.target())?;
        let keep_alive = config.keep_alive();

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .tcp_nodelay(true)
            .tcp_keepalive(Some(keep_alive.interval))
            .http2_keep_alive_timeout(keep_alive.timeout)
            .http2_keep_alive_while_idle(keep_alive.permit_without_stream)
            .use_rustls_tls();
        if !keep_alive.interval.is_zero() {
            builder = builder.http2_keep_alive_interval(Some(keep_alive.interval));
        }

        if let Some(tls) = config.tls() {
            if base.scheme() != "https" {
                return ConnectionSnafu {
                    message: format!("TLS is enabled but target {base} is not https"),
                }
                .fail();
            }
            if let Some(pem) = tls.ca_certificate()? {
                let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                    ConnectionSnafu { message: format!("invalid CA certificate: {e}") }.build()
                })?;
                builder = builder.add_root_certificate(certificate);
            }
            if let Some(server_name) = tls.server_name() {
                tracing::warn!(
                    server_name,
                    url = %base,
                    "TLS server name override is ignored by the HTTP binding"
                );
            }
            builder = builder.https_only(true);
        }

        let client = builder.build().map_err(|e| {
            ConnectionSnafu { message: format!("failed to build HTTP client: {e}") }.build()
        })?;

        tracing::info!(url = %base, kind = %kind, "bound HTTP transport");
        Ok(Self { base, kind, client: RwLock::new(Some(client)) })
    }

    /// Returns the parsed base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }
}

#[async_trait]
impl Transport for HttpBinding {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn resolve(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
        super::resolve_url(&self.base, path, query)
    }

    async fn send(&self, request: TransportRequest) -> Result<RawResponse> {
        let client = self.client.read().clone().ok_or_else(|| ClosedSnafu.build())?;

        let mut builder = client.request(request.method, &request.target).headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = ResponseStatus::Http(response.status().as_u16());
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(RawResponse { status, headers, body })
    }

    fn close(&self) -> bool {
        let released = self.client.write().take().is_some();
        if released {
            tracing::info!(url = %self.base, "closed HTTP transport");
        }
        released
    }

    fn is_closed(&self) -> bool {
        self.client.read().is_none()
    }
}
