//! Pet Store operations.

use std::sync::Arc;

use relaykit_sdk::{
    ApiClient, AsyncHandle, CallContext, ClientConfig, Model, OperationDescriptor, RemoteStatus,
    RestClient, Result, SdkError, Transport, decode,
};

use crate::models::{ApiError, NewPet, Pet};

/// Client for the Pet Store API.
#[derive(Debug, Clone)]
pub struct PetStoreClient {
    rest: RestClient,
}

impl PetStoreClient {
    /// Binds an HTTP transport to the API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Connection`] if the base URL or TLS settings are
    /// unusable.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        Ok(Self { rest: RestClient::connect(config)? })
    }

    /// Creates a client over an existing transport.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self { rest: RestClient::with_transport(config, transport) }
    }

    fn api(&self) -> &ApiClient {
        self.rest.api()
    }

    /// Lists pets, optionally capped at `limit` and filtered by `tag`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::call`].
    pub async fn list_pets(
        &self,
        ctx: &CallContext,
        limit: Option<u32>,
        tag: Option<&str>,
    ) -> Result<Vec<Model<Pet>>> {
        self.api().call(ctx, &list_pets_op(limit, tag)).await
    }

    /// Creates a pet.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::call`].
    pub async fn create_pet(&self, ctx: &CallContext, pet: &NewPet) -> Result<Model<Pet>> {
        self.api().call(ctx, &create_pet_op(pet)).await
    }

    /// Fetches a pet by id.
    ///
    /// # Errors
    ///
    /// Fails with [`SdkError::Remote`] carrying HTTP 404 for an unknown id;
    /// otherwise see [`ApiClient::call`].
    pub async fn get_pet(&self, ctx: &CallContext, pet_id: &str) -> Result<Model<Pet>> {
        self.api().call(ctx, &get_pet_op(pet_id)).await
    }

    /// Replaces a pet.
    ///
    /// # Errors
    ///
    /// See [`get_pet`](Self::get_pet).
    pub async fn update_pet(&self, ctx: &CallContext, pet_id: &str, pet: &NewPet) -> Result<Model<Pet>> {
        self.api().call(ctx, &update_pet_op(pet_id, pet)).await
    }

    /// Deletes a pet. Any response body is ignored.
    ///
    /// # Errors
    ///
    /// See [`get_pet`](Self::get_pet).
    pub async fn delete_pet(&self, ctx: &CallContext, pet_id: &str) -> Result<()> {
        self.api().call_raw(ctx, &delete_pet_op(pet_id)).await?;
        Ok(())
    }

    /// Background variant of [`list_pets`](Self::list_pets).
    pub fn list_pets_async(
        &self,
        ctx: CallContext,
        limit: Option<u32>,
        tag: Option<String>,
    ) -> AsyncHandle<Vec<Model<Pet>>> {
        self.api().call_async(ctx, list_pets_op(limit, tag.as_deref()))
    }

    /// Background variant of [`create_pet`](Self::create_pet).
    pub fn create_pet_async(&self, ctx: CallContext, pet: NewPet) -> AsyncHandle<Model<Pet>> {
        self.api().call_async(ctx, create_pet_op(pet))
    }

    /// Background variant of [`get_pet`](Self::get_pet).
    pub fn get_pet_async(&self, ctx: CallContext, pet_id: impl Into<String>) -> AsyncHandle<Model<Pet>> {
        let pet_id: String = pet_id.into();
        self.api().call_async(ctx, get_pet_op(&pet_id))
    }

    /// Background variant of [`update_pet`](Self::update_pet).
    pub fn update_pet_async(
        &self,
        ctx: CallContext,
        pet_id: impl Into<String>,
        pet: NewPet,
    ) -> AsyncHandle<Model<Pet>> {
        let pet_id: String = pet_id.into();
        self.api().call_async(ctx, update_pet_op(&pet_id, pet))
    }

    /// Background variant of [`delete_pet`](Self::delete_pet).
    pub fn delete_pet_async(&self, ctx: CallContext, pet_id: impl Into<String>) -> AsyncHandle<()> {
        let client = self.clone();
        let task_ctx = ctx.clone();
        let pet_id = pet_id.into();
        self.api().dispatch(ctx, async move { client.delete_pet(&task_ctx, &pet_id).await })
    }

    /// Releases the transport.
    pub fn close(&self) {
        self.rest.close();
    }

    /// Extracts the API error body from a failed HTTP call.
    ///
    /// Returns `None` for failures that never reached the API, and for
    /// error bodies that are not in the documented shape.
    #[must_use]
    pub fn api_error(err: &SdkError) -> Option<ApiError> {
        match err {
            SdkError::Remote { status: RemoteStatus::Http(_), body } => {
                decode(body.as_bytes()).ok()
            },
            SdkError::RetryExhausted { source, .. } => Self::api_error(source),
            _ => None,
        }
    }
}

fn list_pets_op(limit: Option<u32>, tag: Option<&str>) -> OperationDescriptor {
    OperationDescriptor::get("listPets", "/pets")
        .with_optional_query("limit", limit)
        .with_optional_query("tag", tag)
}

fn create_pet_op<B>(pet: B) -> OperationDescriptor<B> {
    OperationDescriptor::post("createPet", "/pets").with_body(pet)
}

fn get_pet_op(pet_id: &str) -> OperationDescriptor {
    OperationDescriptor::get("getPet", "/pets/{petId}").with_path_param("petId", pet_id)
}

fn update_pet_op<B>(pet_id: &str, pet: B) -> OperationDescriptor<B> {
    OperationDescriptor::put("updatePet", "/pets/{petId}")
        .with_path_param("petId", pet_id)
        .with_body(pet)
}

fn delete_pet_op(pet_id: &str) -> OperationDescriptor {
    OperationDescriptor::delete("deletePet", "/pets/{petId}").with_path_param("petId", pet_id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use relaykit_sdk::mock::MockTransport;
    use serde_json::json;

    use super::*;

    fn client() -> (PetStoreClient, Arc<MockTransport>) {
        let mock = Arc::new(MockTransport::new());
        (PetStoreClient::with_transport(ClientConfig::new("http://mock.local"), mock.clone()), mock)
    }

    #[test]
    fn test_operation_shapes() {
        assert_eq!(list_pets_op(None, None).query().len(), 0);
        assert_eq!(list_pets_op(Some(5), Some("dog")).query().len(), 2);
        assert_eq!(get_pet_op("a/b").expand_path().unwrap(), "/pets/a%2Fb");
        assert_eq!(delete_pet_op("7").method(), "DELETE");
        assert_eq!(update_pet_op("7", ()).name(), "updatePet");
    }

    #[tokio::test]
    async fn test_list_pets_query() {
        let (client, mock) = client();
        mock.respond_json(200, &json!([{"id": "1", "name": "Rex"}]));

        let pets = client.list_pets(&CallContext::new(), Some(2), Some("dog")).await.unwrap();

        assert_eq!(pets[0].name, "Rex");
        assert_eq!(mock.last_request().unwrap().target, "http://mock.local/pets?limit=2&tag=dog");
    }

    #[tokio::test]
    async fn test_delete_ignores_body() {
        let (client, mock) = client();
        mock.respond(200, r#"{"deleted": true}"#);

        client.delete_pet(&CallContext::new(), "1").await.unwrap();

        assert_eq!(mock.last_request().unwrap().method, "DELETE");
    }

    #[tokio::test]
    async fn test_delete_async() {
        let (client, mock) = client();
        mock.respond(204, "");

        client.delete_pet_async(CallContext::new(), "9").await.unwrap();

        assert_eq!(mock.last_request().unwrap().target, "http://mock.local/pets/9");
    }

    #[test]
    fn test_api_error_extraction() {
        let remote = SdkError::Remote {
            status: RemoteStatus::Http(404),
            body: r#"{"code":"404","message":"Pet not found"}"#.to_owned(),
        };
        let exhausted = SdkError::RetryExhausted {
            attempts: 4,
            source: Box::new(SdkError::Remote {
                status: RemoteStatus::Http(503),
                body: r#"{"code":"503","message":"maintenance"}"#.to_owned(),
            }),
        };

        assert_eq!(PetStoreClient::api_error(&remote).unwrap().message, "Pet not found");
        assert_eq!(PetStoreClient::api_error(&exhausted).unwrap().code, "503");
        assert!(PetStoreClient::api_error(&SdkError::Closed).is_none());
        assert!(
            PetStoreClient::api_error(&SdkError::Remote {
                status: RemoteStatus::Http(500),
                body: "<html>".to_owned()
            })
            .is_none()
        );
    }
}
