//! Integration tests for the HTTP binding against a local mock server.
//!
//! Each test starts its own `wiremock` server, so they run in parallel
//! without sharing state.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use relaykit_sdk::{
    CallContext, CancelReason, ClientConfig, OperationDescriptor, RemoteStatus, RestClient,
    SdkError, TRACEPARENT_HEADER,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path, query_param},
};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Pet {
    id: u64,
    name: String,
}

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(server.uri()).with_retry(3, Duration::from_millis(10))
}

// ============================================================================
// Request construction
// ============================================================================

#[tokio::test]
async fn test_query_params_and_path_params_reach_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/owners/ann%20lee/pets"))
        .and(query_param("limit", "2"))
        .and(query_param("tag", "dogs & cats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "name": "Rex"}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::connect(config(&server)).unwrap();
    let descriptor = OperationDescriptor::get("listOwnerPets", "/owners/{owner}/pets")
        .with_path_param("owner", "ann lee")
        .with_query("limit", 2)
        .with_optional_query("tag", Some("dogs & cats"))
        .with_optional_query::<u32>("page", None);

    let pets: Vec<Pet> = client.call(&CallContext::new(), &descriptor).await.unwrap();

    assert_eq!(pets, vec![Pet { id: 1, name: "Rex".to_owned() }]);
}

#[tokio::test]
async fn test_operation_header_overrides_default_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pets"))
        .and(header("x-api-key", "per-call"))
        .and(header("x-tenant", "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::connect(
        config(&server).with_header("X-Api-Key", "default").with_header("X-Tenant", "acme"),
    )
    .unwrap();
    let descriptor = OperationDescriptor::get("listPets", "/pets").with_header("X-Api-Key", "per-call");

    let pets: Vec<Pet> = client.call(&CallContext::new(), &descriptor).await.unwrap();

    assert!(pets.is_empty());
}

#[tokio::test]
async fn test_json_body_and_standard_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pets"))
        .and(header("content-type", "application/json"))
        .and(header("accept", "application/json"))
        .and(body_json(json!({"id": 5, "name": "Nib"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 5, "name": "Nib"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::connect(
        config(&server).with_user_agent("petstore-sdk/2.0").with_telemetry(false, None),
    )
    .unwrap();
    let created: Pet = client
        .post(&CallContext::new(), "/pets", &Pet { id: 5, name: "Nib".to_owned() })
        .await
        .unwrap();

    assert_eq!(created.id, 5);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].headers.get("user-agent").unwrap(), "petstore-sdk/2.0");
    assert!(requests[0].headers.get(TRACEPARENT_HEADER).is_none());
}

#[tokio::test]
async fn test_telemetry_injects_trace_context() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = RestClient::connect(config(&server).with_telemetry(true, None)).unwrap();
    let _: serde_json::Value = client.get(&CallContext::new(), "/health").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let traceparent = requests[0].headers.get(TRACEPARENT_HEADER).unwrap().to_str().unwrap();
    let parts: Vec<&str> = traceparent.split('-').collect();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0], "00");
    assert_eq!(parts[1].len(), 32);
    assert_eq!(parts[2].len(), 16);
}

// ============================================================================
// Status classification and retry
// ============================================================================

#[tokio::test]
async fn test_three_failures_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pets/1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pets/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "name": "Rex"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::connect(config(&server)).unwrap();
    let pet: Pet = client.get(&CallContext::new(), "/pets/1").await.unwrap();

    assert_eq!(pet.name, "Rex");
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_persistent_server_error_exhausts_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("broken"))
        .mount(&server)
        .await;

    let client = RestClient::connect(config(&server).with_retry(2, Duration::from_millis(5))).unwrap();
    let err = client.get::<Pet>(&CallContext::new(), "/pets/1").await.unwrap_err();

    assert_eq!(err.attempts(), Some(3));
    assert_eq!(err.status(), Some(&RemoteStatus::Http(500)));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_rate_limited_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2, "name": "Pip"})))
        .mount(&server)
        .await;

    let client = RestClient::connect(config(&server)).unwrap();
    let pet: Pet = client.get(&CallContext::new(), "/pets/2").await.unwrap();

    assert_eq!(pet.id, 2);
}

#[tokio::test]
async fn test_client_error_single_attempt_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"code": 404, "message": "not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::connect(config(&server)).unwrap();
    let err = client.get::<Pet>(&CallContext::new(), "/pets/99").await.unwrap_err();

    match err {
        SdkError::Remote { status: RemoteStatus::Http(404), body } => {
            assert!(body.contains("not found"));
        },
        other => panic!("expected 404, got {other:?}"),
    }
}

#[tokio::test]
async fn test_no_content_decodes_to_unit() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/pets/3"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::connect(config(&server)).unwrap();

    client.delete(&CallContext::new(), "/pets/3").await.unwrap();
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::connect(config(&server)).unwrap();
    let err = client.get::<Pet>(&CallContext::new(), "/pets/1").await.unwrap_err();

    assert!(matches!(err, SdkError::Decode { .. }));
}

#[tokio::test]
async fn test_unreachable_server_is_retried_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = RestClient::connect(
        ClientConfig::new(format!("http://{addr}")).with_retry(1, Duration::from_millis(5)),
    )
    .unwrap();
    let err = client.get::<Pet>(&CallContext::new(), "/pets").await.unwrap_err();

    match err {
        SdkError::RetryExhausted { attempts: 2, source } => {
            assert!(matches!(*source, SdkError::Transport { .. }));
        },
        other => panic!("expected exhausted transport error, got {other:?}"),
    }
}

// ============================================================================
// Timeouts and cancellation
// ============================================================================

#[tokio::test]
async fn test_request_timeout_is_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let client = RestClient::connect(config(&server).with_timeout(Duration::from_millis(100))).unwrap();
    let err = client.get::<Pet>(&CallContext::new(), "/slow").await.unwrap_err();

    assert!(matches!(err, SdkError::Cancelled { reason: CancelReason::Deadline(_) }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_during_retry_delay() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = RestClient::connect(config(&server).with_retry(5, Duration::from_secs(30))).unwrap();
    let ctx = CallContext::new();
    let trigger = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = client.get::<Pet>(&ctx, "/pets/1").await.unwrap_err();

    assert!(matches!(err, SdkError::Cancelled { reason: CancelReason::Caller }));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_async_call_delivers_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 8, "name": "Oz"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::connect(config(&server)).unwrap();
    let handle = client.call_async::<(), Pet>(CallContext::new(), OperationDescriptor::get("getPet", "/pets/8"));

    assert_eq!(handle.await.unwrap().name, "Oz");
}

#[tokio::test]
async fn test_closed_client_rejects_calls() {
    let server = MockServer::start().await;
    let client = RestClient::connect(config(&server)).unwrap();

    client.close();
    let err = client.get::<Pet>(&CallContext::new(), "/pets").await.unwrap_err();

    assert!(matches!(err, SdkError::Closed));
    assert!(server.received_requests().await.unwrap().is_empty());
}
