//! Pet Store API client.
//!
//! Typed models and operations for the Pet Store REST API. Every operation
//! is a thin descriptor over [`relaykit_sdk`], which handles transport,
//! retry, timeouts and decoding.
//!
//! ```no_run
//! use relaykit_petstore::{NewPet, PetStoreClient};
//! use relaykit_sdk::{CallContext, ClientConfig};
//!
//! # async fn example() -> relaykit_sdk::Result<()> {
//! let client = PetStoreClient::connect(ClientConfig::new("https://petstore.example.com/v1"))?;
//! let ctx = CallContext::new();
//!
//! let created = client.create_pet(&ctx, &NewPet::builder().name("Rex").tag("dog").build()).await?;
//! let dogs = client.list_pets(&ctx, Some(10), Some("dog")).await?;
//! assert!(dogs.iter().any(|pet| pet.id == created.id));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod models;

pub use client::PetStoreClient;
pub use models::{ApiError, Category, NewPet, Pet};
