//! Protocol-specific clients built on [`ApiClient`](crate::ApiClient).

mod graphql;
mod grpc;
mod rest;

pub use graphql::{GraphQlClient, GraphQlError, GraphQlLocation, GraphQlRequest, GraphQlResponse};
pub use grpc::GrpcClient;
pub use rest::RestClient;
