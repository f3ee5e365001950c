//! Proptest strategies for request and payload values.
//!
//! Generators produce well-formed JSON documents, header sets and query
//! parameters while still reaching the awkward corners: unicode strings,
//! reserved URL characters, empty containers and nested objects.
//!
//! # Usage
//!
//! ```no_run
//! use proptest::prelude::*;
//! use relaykit_test_utils::strategies;
//!
//! proptest! {
//!     #[test]
//!     fn body_survives_encoding(value in strategies::arb_json_value()) {
//!         let bytes = serde_json::to_vec(&value).unwrap();
//!         prop_assert_eq!(serde_json::from_slice::<serde_json::Value>(&bytes).unwrap(), value);
//!     }
//! }
//! ```

use proptest::prelude::*;
use serde_json::{Map, Number, Value};

/// Generates a JSON scalar: null, boolean, integer, finite float or string.
pub fn arb_json_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        (-1.0e9f64..1.0e9).prop_filter_map("finite", |f| Number::from_f64(f).map(Value::Number)),
        ".{0,16}".prop_map(Value::String),
    ]
}

/// Generates an arbitrary JSON value nested up to three levels deep.
pub fn arb_json_value() -> impl Strategy<Value = Value> {
    arb_json_scalar().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::btree_map("[a-zA-Z_][a-zA-Z0-9_-]{0,8}", inner, 0..4)
                .prop_map(|entries| Value::Object(entries.into_iter().collect())),
        ]
    })
}

/// Generates a map of vendor-extension keys (`x-...`) to JSON values.
///
/// The `x-` prefix keeps the keys clear of any declared model field.
pub fn arb_additional_properties() -> impl Strategy<Value = Map<String, Value>> {
    proptest::collection::btree_map("x-[a-z][a-z0-9-]{0,12}", arb_json_value(), 0..5)
        .prop_map(|entries| entries.into_iter().collect())
}

/// Generates a lowercase HTTP header name.
pub fn arb_header_name() -> impl Strategy<Value = String> {
    "x-[a-z][a-z0-9-]{0,15}"
}

/// Generates a printable ASCII header value.
pub fn arb_header_value() -> impl Strategy<Value = String> {
    "[ -~]{0,32}".prop_map(|v| v.trim().to_owned())
}

/// Generates up to six distinct header name/value pairs.
pub fn arb_headers() -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::btree_map(arb_header_name(), arb_header_value(), 0..6)
        .prop_map(|headers| headers.into_iter().collect())
}

/// Generates a single path segment, including characters that need escaping.
pub fn arb_path_segment() -> impl Strategy<Value = String> {
    prop_oneof!["[a-zA-Z0-9_.~-]{1,12}", "[a-z /?#&=%+]{1,12}", "\\PC{1,6}",]
}

/// Generates up to five distinct query parameters with arbitrary values.
pub fn arb_query_params() -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::btree_map("[a-z][a-z0-9_]{0,8}", ".{0,12}", 0..5)
        .prop_map(|params| params.into_iter().collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn depth(value: &Value) -> usize {
        match value {
            Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
            Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
            _ => 0,
        }
    }

    proptest! {
        #[test]
        fn json_values_are_bounded(value in arb_json_value()) {
            prop_assert!(depth(&value) <= 3);
        }

        #[test]
        fn additional_properties_use_extension_keys(extra in arb_additional_properties()) {
            prop_assert!(extra.keys().all(|k| k.starts_with("x-")));
        }

        #[test]
        fn headers_are_valid(headers in arb_headers()) {
            for (name, value) in &headers {
                prop_assert!(name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-'));
                prop_assert!(value.bytes().all(|b| (b' '..=b'~').contains(&b)));
            }
        }

        #[test]
        fn path_segments_are_non_empty(segment in arb_path_segment()) {
            prop_assert!(!segment.is_empty());
        }
    }
}
