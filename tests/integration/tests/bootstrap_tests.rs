//! HTTP bootstrap integration tests
//!
//! The REST API is a wiremock server; the gateway connection that follows
//! goes over the in-memory transport.
//!
//! Run with: cargo test -p integration-tests --test bootstrap_tests

use chord_common::{ClientError, Credential};
use chord_gateway::protocol::OpCode;
use integration_tests::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

// ============================================================================
// Gateway resolution
// ============================================================================

#[tokio::test]
async fn test_connect_resolves_gateway_url() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway"))
        .and(query_param("encoding", "json"))
        .and(query_param("v", "4"))
        .and(header("Authorization", TEST_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(gateway_body("wss://gateway.test")))
        .expect(1)
        .mount(&api.server)
        .await;

    let mut gateway = TestGateway::with_config(api.config());
    let mut handle = gateway
        .client
        .connect(Credential::new(TEST_TOKEN))
        .await
        .unwrap();

    let mut peer = gateway.accept().await.unwrap();
    assert_eq!(peer.url(), "wss://gateway.test?encoding=json&v=4");
    expect_op(&mut peer, OpCode::Identify).await.unwrap();

    handle.stop();
    handle.wait().await.unwrap();
}

#[tokio::test]
async fn test_gateway_resolution_failure() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "401: Unauthorized" })))
        .mount(&api.server)
        .await;

    let gateway = TestGateway::with_config(api.config());
    let result = gateway.client.connect(Credential::new(TEST_TOKEN)).await;

    assert!(matches!(result, Err(ClientError::Bootstrap(_))));
    assert_eq!(gateway.connector.connect_count(), 0);
}

#[tokio::test]
async fn test_blank_credential_makes_no_requests() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gateway_body("wss://gateway.test")))
        .expect(0)
        .mount(&api.server)
        .await;

    let gateway = TestGateway::with_config(api.config());
    let result = gateway.client.connect(Credential::new("")).await;

    assert!(matches!(result, Err(ClientError::Bootstrap(_))));
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_then_connect() {
    let api = MockApi::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({ "email": "nelly@example.com", "password": "hunter2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": TEST_TOKEN })))
        .expect(1)
        .mount(&api.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gateway"))
        .and(header("Authorization", TEST_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(gateway_body("wss://gateway.test")))
        .mount(&api.server)
        .await;

    let mut config = api.config();
    config.credentials.email = Some("nelly@example.com".to_string());
    config.credentials.password = Some("hunter2".to_string());
    let mut gateway = TestGateway::with_config(config);

    let credential = gateway.client.configured_credential().await.unwrap();
    assert_eq!(credential.expose(), TEST_TOKEN);

    let mut handle = gateway.client.connect(credential).await.unwrap();
    let mut peer = gateway.accept().await.unwrap();
    let identify = expect_op(&mut peer, OpCode::Identify).await.unwrap();
    assert_eq!(identify.d["token"], TEST_TOKEN);

    handle.stop();
    handle.wait().await.unwrap();
}

#[tokio::test]
async fn test_login_rejected() {
    let api = MockApi::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "email": ["Email does not exist."] })))
        .mount(&api.server)
        .await;

    let gateway = TestGateway::with_config(api.config());
    let result = gateway.client.login("nobody@example.com", "wrong").await;

    assert!(matches!(result, Err(ClientError::Bootstrap(_))));
}

#[tokio::test]
async fn test_configured_token_skips_login() {
    let api = MockApi::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "other" })))
        .expect(0)
        .mount(&api.server)
        .await;

    let mut config = api.config();
    config.credentials.token = Some(TEST_TOKEN.to_string());
    config.credentials.email = Some("nelly@example.com".to_string());
    config.credentials.password = Some("hunter2".to_string());
    let gateway = TestGateway::with_config(config);

    let credential = gateway.client.configured_credential().await.unwrap();
    assert_eq!(credential.expose(), TEST_TOKEN);
}

#[tokio::test]
async fn test_no_credentials_configured() {
    let gateway = TestGateway::new();
    let result = gateway.client.configured_credential().await;

    assert!(matches!(result, Err(ClientError::Bootstrap(_))));
}
