//! Pet Store models.
//!
//! Optional fields are omitted from the wire when unset. Wrap a model in
//! [`Model`](relaykit_sdk::Model) to keep keys the API adds later.

use relaykit_sdk::Schema;
use serde::{Deserialize, Serialize};

/// A pet in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
pub struct Pet {
    /// Unique identifier for the pet.
    pub id: String,
    /// Name of the pet.
    pub name: String,
    /// Tag associated with the pet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Pet status in the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Category the pet is listed under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    /// URLs of pet photos.
    #[serde(rename = "photoUrls", default, skip_serializing_if = "Option::is_none")]
    pub photo_urls: Option<Vec<String>>,
}

impl Schema for Pet {
    const FIELDS: &'static [&'static str] = &["id", "name", "tag", "status", "category", "photoUrls"];
}

/// Request body for creating or replacing a pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
pub struct NewPet {
    /// Name of the pet.
    pub name: String,
    /// Tag associated with the pet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// URLs of pet photos.
    #[serde(rename = "photoUrls", default, skip_serializing_if = "Option::is_none")]
    pub photo_urls: Option<Vec<String>>,
}

impl Schema for NewPet {
    const FIELDS: &'static [&'static str] = &["name", "tag", "photoUrls"];
}

/// Pet category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Category name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Schema for Category {
    const FIELDS: &'static [&'static str] = &["id", "name"];
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional error details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Schema for ApiError {
    const FIELDS: &'static [&'static str] = &["code", "message", "details"];
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use relaykit_sdk::Model;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_unset_optionals_are_omitted() {
        let pet = NewPet::builder().name("Rex").build();

        assert_eq!(serde_json::to_value(&pet).unwrap(), json!({"name": "Rex"}));
    }

    #[test]
    fn test_pet_wire_names() {
        let pet = Pet::builder()
            .id("1")
            .name("Rex")
            .photo_urls(vec!["https://img/1.png".to_owned()])
            .category(Category { id: Some("c1".to_owned()), name: None })
            .build();

        assert_eq!(
            serde_json::to_value(&pet).unwrap(),
            json!({"id": "1", "name": "Rex", "category": {"id": "c1"}, "photoUrls": ["https://img/1.png"]})
        );
    }

    #[test]
    fn test_unknown_keys_survive_in_model() {
        let body = json!({"id": "1", "name": "Rex", "status": "available", "x-breed": "collie"});

        let pet: Model<Pet> = serde_json::from_value(body.clone()).unwrap();

        assert_eq!(pet.status.as_deref(), Some("available"));
        assert_eq!(pet.additional_properties().get("x-breed").unwrap(), "collie");
        assert_eq!(serde_json::to_value(&pet).unwrap(), body);
    }

    #[test]
    fn test_error_body_decodes() {
        let error: ApiError =
            serde_json::from_value(json!({"code": "404", "message": "Pet not found"})).unwrap();

        assert_eq!(error.message, "Pet not found");
        assert!(error.details.is_none());
    }
}
