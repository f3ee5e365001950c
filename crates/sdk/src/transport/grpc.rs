//! gRPC binding over a `tonic` channel.
//!
//! Messages travel as JSON bytes through a pass-through codec, so generated
//! clients can use the same model types for every transport. A status other
//! than `OK` comes back as a [`RawResponse`]; only failures that never reached
//! the server surface as transport errors.

use std::error::Error as _;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes};
use parking_lot::RwLock;
use tonic::{
    Code, Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
    metadata::MetadataMap,
    transport::{Certificate, Channel, ClientTlsConfig, Endpoint},
};

use super::{RawResponse, ResponseStatus, Transport, TransportKind, TransportRequest};
use crate::{
    config::ClientConfig,
    error::{ClosedSnafu, ConnectionSnafu, RequestBuildSnafu, Result, SdkError},
};

/// gRPC binding for unary calls with JSON payloads.
///
/// Cloning a tonic [`Channel`] shares its HTTP/2 connection, so each call
/// takes a clone and the binding needs no further locking.
#[derive(Debug)]
pub struct GrpcBinding {
    target: String,
    max_receive: usize,
    max_send: usize,
    channel: RwLock<Option<Channel>>,
}

impl GrpcBinding {
    /// Connects to the configured target.
    ///
    /// Targets without a scheme (`host:port`) get `https://` when TLS is
    /// enabled and `http://` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Connection`] if the target is malformed, TLS setup
    /// fails, or the server cannot be reached within the connect timeout.
    pub async fn bind(config: &ClientConfig) -> Result<Self> {
        let endpoint = configure_endpoint(config)?;
        let uri = endpoint.uri().to_string();

        let channel = endpoint.connect().await.map_err(|e| {
            ConnectionSnafu { message: format!("failed to connect to {uri}: {e}") }.build()
        })?;

        tracing::info!(%uri, "bound gRPC transport");
        Ok(Self::from_channel(channel, config))
    }

    /// Wraps an existing channel, applying the configured message caps.
    #[must_use]
    pub fn from_channel(channel: Channel, config: &ClientConfig) -> Self {
        Self {
            target: config.target().to_owned(),
            max_receive: config.grpc().max_receive_message_size,
            max_send: config.grpc().max_send_message_size,
            channel: RwLock::new(Some(channel)),
        }
    }

    /// Returns a clone of the channel for generated service stubs.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Closed`] after [`close`](Transport::close).
    pub fn channel(&self) -> Result<Channel> {
        self.channel.read().clone().ok_or_else(|| ClosedSnafu.build())
    }
}

/// Builds a tonic endpoint from the shared configuration.
fn configure_endpoint(config: &ClientConfig) -> Result<Endpoint> {
    let target = config.target();
    let uri = match (target.contains("://"), config.tls().is_some()) {
        (true, true) if !target.starts_with("https://") => {
            return ConnectionSnafu {
                message: format!("TLS is enabled but target {target} is not https"),
            }
            .fail();
        },
        (true, _) => target.to_owned(),
        (false, true) => format!("https://{target}"),
        (false, false) => format!("http://{target}"),
    };

    let keep_alive = config.keep_alive();
    let mut endpoint = Endpoint::from_shared(uri.clone())
        .map_err(|e| ConnectionSnafu { message: format!("invalid target {uri:?}: {e}") }.build())?
        .user_agent(config.user_agent())
        .map_err(|e| ConnectionSnafu { message: format!("invalid user agent: {e}") }.build())?
        .connect_timeout(config.connect_timeout())
        .tcp_nodelay(true)
        .tcp_keepalive(Some(keep_alive.interval))
        .keep_alive_timeout(keep_alive.timeout)
        .keep_alive_while_idle(keep_alive.permit_without_stream);
    if !keep_alive.interval.is_zero() {
        endpoint = endpoint.http2_keep_alive_interval(keep_alive.interval);
    }

    if let Some(tls) = config.tls() {
        let mut tls_config = ClientTlsConfig::new().with_webpki_roots();
        if let Some(server_name) = tls.server_name() {
            tls_config = tls_config.domain_name(server_name);
        }
        if let Some(pem) = tls.ca_certificate()? {
            tls_config = tls_config.ca_certificate(Certificate::from_pem(pem));
        }
        endpoint = endpoint.tls_config(tls_config).map_err(|e| {
            ConnectionSnafu { message: format!("TLS setup failed: {e}") }.build()
        })?;
    }

    Ok(endpoint)
}

/// Returns true for `/package.Service/Method` paths.
fn is_method_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    match rest.split_once('/') {
        Some((service, method)) => !service.is_empty() && !method.is_empty() && !method.contains('/'),
        None => false,
    }
}

#[async_trait]
impl Transport for GrpcBinding {
    fn kind(&self) -> TransportKind {
        TransportKind::Grpc
    }

    fn resolve(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
        if !query.is_empty() {
            return RequestBuildSnafu {
                message: format!("gRPC call {path} cannot carry query parameters"),
            }
            .fail();
        }
        if !is_method_path(path) {
            return RequestBuildSnafu {
                message: format!("{path:?} is not a /package.Service/Method path"),
            }
            .fail();
        }
        Ok(path.to_owned())
    }

    async fn send(&self, request: TransportRequest) -> Result<RawResponse> {
        let channel = self.channel()?;
        let path = request.target.parse::<::http::uri::PathAndQuery>().map_err(|e| {
            RequestBuildSnafu { message: format!("invalid method path {:?}: {e}", request.target) }
                .build()
        })?;

        let mut grpc = tonic::client::Grpc::new(channel)
            .max_decoding_message_size(self.max_receive)
            .max_encoding_message_size(self.max_send);
        grpc.ready().await?;

        let mut call = tonic::Request::new(request.body.unwrap_or_default());
        *call.metadata_mut() = MetadataMap::from_headers(request.headers);

        match grpc.unary(call, path, JsonBytesCodec).await {
            Ok(response) => {
                let headers = response.metadata().clone().into_headers();
                Ok(RawResponse {
                    status: ResponseStatus::Grpc(Code::Ok),
                    headers,
                    body: response.into_inner(),
                })
            },
            Err(status) if status.code() == Code::Unavailable && status.source().is_some() => {
                Err(SdkError::transport(status))
            },
            Err(status) => Ok(RawResponse {
                status: ResponseStatus::Grpc(status.code()),
                headers: status.metadata().clone().into_headers(),
                body: Bytes::copy_from_slice(status.message().as_bytes()),
            }),
        }
    }

    fn close(&self) -> bool {
        let released = self.channel.write().take().is_some();
        if released {
            tracing::info!(target_addr = %self.target, "closed gRPC transport");
        }
        released
    }

    fn is_closed(&self) -> bool {
        self.channel.read().is_none()
    }
}

/// Pass-through codec: request and response messages are already-encoded JSON.
#[derive(Debug, Clone, Copy, Default)]
struct JsonBytesCodec;

#[derive(Debug, Clone, Copy, Default)]
struct JsonBytesEncoder;

#[derive(Debug, Clone, Copy, Default)]
struct JsonBytesDecoder;

impl Codec for JsonBytesCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = JsonBytesEncoder;
    type Decoder = JsonBytesDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        JsonBytesEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        JsonBytesDecoder
    }
}

impl Encoder for JsonBytesEncoder {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Bytes, dst: &mut EncodeBuf<'_>) -> std::result::Result<(), Status> {
        dst.put(item);
        Ok(())
    }
}

impl Decoder for JsonBytesDecoder {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> std::result::Result<Option<Bytes>, Status> {
        let len = src.remaining();
        Ok(Some(src.copy_to_bytes(len)))
    }
}
