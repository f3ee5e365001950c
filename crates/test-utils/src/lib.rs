//! Shared test utilities for relaykit crates.
//!
//! - [`assert_eventually`] - Poll a condition until it's true or timeout
//! - [`strategies`] - Proptest generators for JSON payloads, headers and query parameters

#![deny(unsafe_code)]

mod assertions;
pub use assertions::{assert_eventually, assert_eventually_every};

pub mod strategies;
