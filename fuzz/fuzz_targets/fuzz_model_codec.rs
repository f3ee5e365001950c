//! Fuzz target for the model codec.
//!
//! Tests that decoding arbitrary bytes into a `Model` never panics, and that
//! every successfully decoded model re-encodes to an equivalent document with
//! its additional properties intact.

#![no_main]

use libfuzzer_sys::fuzz_target;
use relaykit_sdk::{Model, Schema, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Pet {
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
}

impl Schema for Pet {
    const FIELDS: &'static [&'static str] = &["id", "name", "tag"];
}

fuzz_target!(|data: &[u8]| {
    let Ok(model) = decode::<Model<Pet>>(data) else {
        return;
    };

    let bytes = encode(&model).expect("decoded model must encode");
    let again: Model<Pet> = decode(&bytes).expect("encoded model must decode");
    assert_eq!(*again, *model, "declared fields changed across round trip");
    assert_eq!(again.additional_properties(), model.additional_properties());

    let original: Value = serde_json::from_slice(data).expect("decoded input is JSON");
    let reencoded: Value = serde_json::from_slice(&bytes).expect("encoded output is JSON");
    for (key, value) in model.additional_properties() {
        assert_eq!(reencoded.get(key), Some(value), "extra {key} changed");
        assert_eq!(original.get(key), Some(value), "extra {key} not taken from input");
    }
});
