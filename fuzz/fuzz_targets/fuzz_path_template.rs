//! Fuzz target for path template expansion.
//!
//! Tests that expanding an arbitrary template never panics, and that a
//! substituted value is always percent-encoded so it cannot introduce a new
//! path segment, query or fragment.

#![no_main]

use libfuzzer_sys::fuzz_target;
use relaykit_sdk::OperationDescriptor;

fuzz_target!(|input: (&str, &str)| {
    let (template, value) = input;
    let descriptor = OperationDescriptor::get("fuzz", template).with_path_param("p", value);
    let _ = descriptor.expand_path();

    let fixed = OperationDescriptor::get("fuzz", "/items/{p}").with_path_param("p", value);
    let expanded = fixed.expand_path().expect("template with a bound parameter expands");
    let segment = &expanded["/items/".len()..];
    assert!(!segment.contains(['/', '?', '#']), "unescaped delimiter in {segment:?}");
});
