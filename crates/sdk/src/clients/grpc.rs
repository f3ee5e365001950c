//! gRPC client for unary calls.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tonic::transport::Channel;

use crate::{
    client::ApiClient,
    config::ClientConfig,
    context::CallContext,
    descriptor::OperationDescriptor,
    dispatch::AsyncHandle,
    error::Result,
    transport::GrpcBinding,
};

/// Client for a gRPC service.
///
/// Messages travel as JSON, so request and response types only need serde
/// impls. Generated protobuf stubs can share the connection through
/// [`channel`](Self::channel).
#[derive(Debug, Clone)]
pub struct GrpcClient {
    api: ApiClient,
    binding: Arc<GrpcBinding>,
}

impl GrpcClient {
    /// Connects to the configured target.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Connection`](crate::SdkError::Connection) if the
    /// target is malformed or unreachable.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let binding = match GrpcBinding::bind(&config).await {
            Ok(binding) => Arc::new(binding),
            Err(err) => return Err(ApiClient::bind_failed(&config, err)),
        };
        Ok(Self { api: ApiClient::bound(config, binding.clone()), binding })
    }

    /// Creates a client over an existing channel.
    #[must_use]
    pub fn from_channel(channel: Channel, config: ClientConfig) -> Self {
        let binding = Arc::new(GrpcBinding::from_channel(channel, &config));
        Self { api: ApiClient::with_transport(config, binding.clone()), binding }
    }

    /// Returns the underlying call surface.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Returns a clone of the underlying channel.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Closed`](crate::SdkError::Closed) after
    /// [`close`](Self::close).
    pub fn channel(&self) -> Result<Channel> {
        self.binding.channel()
    }

    /// Invokes `/package.Service/Method` with `request`.
    ///
    /// # Errors
    ///
    /// - [`SdkError::RequestBuild`](crate::SdkError::RequestBuild) if
    ///   `method_path` is not a method path.
    /// - [`SdkError::Remote`](crate::SdkError::Remote) with
    ///   [`RemoteStatus::Grpc`](crate::RemoteStatus::Grpc) for a non-`OK` status.
    /// - Any other error of [`ApiClient::call`].
    pub async fn unary<Req, Resp>(&self, ctx: &CallContext, method_path: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        self.api.call(ctx, &OperationDescriptor::rpc(method_path).with_body(request)).await
    }

    /// Invokes a unary method on a background task.
    pub fn unary_async<Req, Resp>(
        &self,
        ctx: CallContext,
        method_path: impl Into<String>,
        request: Req,
    ) -> AsyncHandle<Resp>
    where
        Req: Serialize + Send + Sync + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        self.api.call_async(ctx, OperationDescriptor::rpc(method_path).with_body(request))
    }

    /// Closes the channel.
    pub fn close(&self) {
        self.api.close();
    }
}
