//! REST client.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    client::ApiClient,
    config::ClientConfig,
    context::CallContext,
    descriptor::OperationDescriptor,
    dispatch::AsyncHandle,
    error::Result,
    transport::{HttpBinding, Transport},
};

/// Client for a JSON-over-HTTP service.
///
/// Generated service clients call [`call`](Self::call) with their operation
/// descriptors. The verb helpers cover ad-hoc requests against a literal path.
#[derive(Debug, Clone)]
pub struct RestClient {
    api: ApiClient,
}

impl RestClient {
    /// Binds an HTTP transport to the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Connection`](crate::SdkError::Connection) if the
    /// target or TLS settings are unusable.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let binding = HttpBinding::bind(&config).map(Arc::new);
        Ok(Self { api: ApiClient::from_binding(config, binding)? })
    }

    /// Creates a client over an existing transport.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self { api: ApiClient::with_transport(config, transport) }
    }

    /// Returns the underlying call surface.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Runs an operation and decodes its response.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::call`].
    pub async fn call<B, T>(&self, ctx: &CallContext, descriptor: &OperationDescriptor<B>) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        self.api.call(ctx, descriptor).await
    }

    /// Runs an operation on a background task.
    pub fn call_async<B, T>(&self, ctx: CallContext, descriptor: OperationDescriptor<B>) -> AsyncHandle<T>
    where
        B: Serialize + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
    {
        self.api.call_async(ctx, descriptor)
    }

    /// Sends `GET path`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::call`].
    pub async fn get<T: DeserializeOwned>(&self, ctx: &CallContext, path: &str) -> Result<T> {
        self.api.call(ctx, &OperationDescriptor::get(format!("GET {path}"), path)).await
    }

    /// Sends `POST path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::call`].
    pub async fn post<B, T>(&self, ctx: &CallContext, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let descriptor = OperationDescriptor::post(format!("POST {path}"), path).with_body(body);
        self.api.call(ctx, &descriptor).await
    }

    /// Sends `PUT path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::call`].
    pub async fn put<B, T>(&self, ctx: &CallContext, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let descriptor = OperationDescriptor::put(format!("PUT {path}"), path).with_body(body);
        self.api.call(ctx, &descriptor).await
    }

    /// Sends `DELETE path`, discarding any response body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::call`].
    pub async fn delete(&self, ctx: &CallContext, path: &str) -> Result<()> {
        self.api.call_raw(ctx, &OperationDescriptor::delete(format!("DELETE {path}"), path)).await?;
        Ok(())
    }

    /// Releases the transport.
    pub fn close(&self) {
        self.api.close();
    }
}
