//! JSON model codec with additional-properties preservation.
//!
//! Generated models declare their wire field names through [`Schema`] and are
//! wrapped in [`Model`] wherever unknown keys must survive a round trip. On
//! decode, declared keys populate the typed fields and every other key lands
//! in [`AdditionalProperties`]. On encode, declared fields are written first
//! and extras are merged in after them; a declared field always wins over an
//! extra with the same name.
//!
//! ```
//! use relaykit_sdk::{Model, Schema};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Tag {
//!     name: String,
//! }
//!
//! impl Schema for Tag {
//!     const FIELDS: &'static [&'static str] = &["name"];
//! }
//!
//! let tag: Model<Tag> = serde_json::from_str(r#"{"name":"a","x-color":"red"}"#).unwrap();
//! assert_eq!(tag.name, "a");
//! assert_eq!(tag.additional_properties().get("x-color").unwrap(), "red");
//! ```

use std::ops::{Deref, DerefMut};

use bytes::Bytes;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{DeserializeOwned, Error as _},
    ser::{Error as _, SerializeMap},
};
use serde_json::{Map, Value};

use crate::error::{DecodeSnafu, RequestBuildSnafu, Result};

/// A generated model type with a fixed set of declared wire fields.
pub trait Schema: Serialize + DeserializeOwned {
    /// Wire names of the declared fields, after any serde renaming.
    const FIELDS: &'static [&'static str];

    /// Returns true if `name` is a declared field.
    fn is_declared(name: &str) -> bool {
        Self::FIELDS.contains(&name)
    }
}

/// Keys found on the wire that the model does not declare.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdditionalProperties(Map<String, Value>);

impl AdditionalProperties {
    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns the number of extra keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no extra keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the extra keys and values.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns the underlying JSON map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl<'a> IntoIterator for &'a AdditionalProperties {
    type Item = (&'a String, &'a Value);
    type IntoIter = serde_json::map::Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A model plus the undeclared keys that arrived with it.
///
/// Dereferences to the inner model, so declared fields read as `model.name`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model<T> {
    fields: T,
    additional_properties: AdditionalProperties,
}

impl<T: Schema> Model<T> {
    /// Wraps a model with no additional properties.
    #[must_use]
    pub fn new(fields: T) -> Self {
        Self { fields, additional_properties: AdditionalProperties::default() }
    }

    /// Returns the additional properties.
    #[must_use]
    pub fn additional_properties(&self) -> &AdditionalProperties {
        &self.additional_properties
    }

    /// Stores an extra key, returning false (and storing nothing) when `key`
    /// names a declared field.
    pub fn set_additional_property(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if T::is_declared(&key) {
            return false;
        }
        self.additional_properties.0.insert(key, value);
        true
    }

    /// Removes an extra key, returning its value.
    pub fn remove_additional_property(&mut self, key: &str) -> Option<Value> {
        self.additional_properties.0.remove(key)
    }

    /// Returns the inner model, discarding extras.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.fields
    }

    /// Splits the wrapper into the model and its extras.
    #[must_use]
    pub fn into_parts(self) -> (T, AdditionalProperties) {
        (self.fields, self.additional_properties)
    }
}

impl<T: Schema> From<T> for Model<T> {
    fn from(fields: T) -> Self {
        Self::new(fields)
    }
}

impl<T> Deref for Model<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.fields
    }
}

impl<T> DerefMut for Model<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.fields
    }
}

impl<T: Schema> Serialize for Model<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let declared = match serde_json::to_value(&self.fields).map_err(S::Error::custom)? {
            Value::Object(map) => map,
            other => {
                return Err(S::Error::custom(format!(
                    "model must serialize to a JSON object, got {}",
                    json_kind(&other)
                )));
            },
        };

        let extras: Vec<_> = self
            .additional_properties
            .iter()
            .filter(|(key, _)| !declared.contains_key(*key) && !T::is_declared(key))
            .collect();

        let mut map = serializer.serialize_map(Some(declared.len() + extras.len()))?;
        for (key, value) in &declared {
            map.serialize_entry(key, value)?;
        }
        for (key, value) in extras {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de, T: Schema> Deserialize<'de> for Model<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let object = Map::<String, Value>::deserialize(deserializer)?;

        let mut declared = Map::new();
        let mut additional = Map::new();
        for (key, value) in object {
            if T::is_declared(&key) {
                declared.insert(key, value);
            } else {
                additional.insert(key, value);
            }
        }

        let fields = T::deserialize(Value::Object(declared)).map_err(D::Error::custom)?;
        Ok(Self { fields, additional_properties: AdditionalProperties(additional) })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Encodes a request body as JSON.
///
/// # Errors
///
/// Returns [`SdkError::RequestBuild`](crate::SdkError::RequestBuild) if the
/// value cannot be serialized.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| RequestBuildSnafu { message: format!("failed to encode body: {e}") }.build())
}

/// Decodes a JSON response body. An empty body decodes as JSON `null`.
///
/// # Errors
///
/// Returns [`SdkError::Decode`](crate::SdkError::Decode) if the body is not
/// valid JSON for `T`.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let body = if body.iter().all(u8::is_ascii_whitespace) { b"null".as_slice() } else { body };
    serde_json::from_slice(body)
        .map_err(|e| DecodeSnafu { message: format!("failed to decode response: {e}") }.build())
}
