//! Startup flow tests: join token over HTTP, session init, connect.
//!
//! The rooms API is served by wiremock; the media session is a
//! `MockSession`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::secret::ExposeSecret;
use room_sync::client::RoomClient;
use room_sync::errors::SyncError;
use room_sync::session::SessionInit;
use room_test_utils::*;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token_path() -> String {
    format!("/v2/rooms/{TEST_ROOM_ID}/actions/generate_join_client_token")
}

async fn token_server(status: u16, body: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(token_path()))
        .and(header("authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_start_fetches_token_and_initializes_session() {
    let server = token_server(
        200,
        json!({
            "data": {
                "token": "minted-client-token",
                "refresh_token": "minted-refresh-token",
                "token_expires_at": "2026-01-01T00:10:00Z"
            }
        }),
    )
    .await;

    let session = MockSession::new();
    let connector = MockConnector::new(session.clone());
    let config = test_config(&server.uri());

    let client = RoomClient::start(&config, &connector, MockCapture::granted())
        .await
        .unwrap();

    let init: SessionInit = session.init().unwrap();
    assert_eq!(init.room_id, TEST_ROOM_ID);
    assert_eq!(init.client_token.expose_secret(), "minted-client-token");
    assert_eq!(init.context, config.client_context);
    assert_eq!(init.log_level, config.log_level);
    assert_eq!(session.commands().first(), Some(&SessionCommand::Connect));
    assert_eq!(client.room_id(), TEST_ROOM_ID);

    client.shutdown().await.unwrap();
    assert_eq!(session.commands().last(), Some(&SessionCommand::Disconnect));
}

#[tokio::test]
async fn test_rejected_api_key_is_fatal() {
    let server = token_server(401, json!({ "errors": [{ "detail": "bad key" }] })).await;

    let session = MockSession::new();
    let connector = MockConnector::new(session.clone());

    let result = RoomClient::start(
        &test_config(&server.uri()),
        &connector,
        MockCapture::granted(),
    )
    .await;

    let err = result.err().expect("start should fail");
    assert!(matches!(err, SyncError::TokenAcquisition(_)));
    assert!(err.is_fatal());
    assert!(session.init().is_none());
    assert!(session.commands().is_empty());
}

#[tokio::test]
async fn test_token_response_without_token_is_fatal() {
    let server = token_server(200, json!({ "data": {} })).await;
    let connector = MockConnector::new(MockSession::new());

    let result = RoomClient::start(
        &test_config(&server.uri()),
        &connector,
        MockCapture::granted(),
    )
    .await;

    assert!(matches!(result, Err(SyncError::TokenAcquisition(_))));
}

#[tokio::test]
async fn test_initialize_failure_is_fatal() {
    let result = RoomClient::start_with_token(
        &test_config("http://127.0.0.1:1"),
        test_token(),
        &MockConnector::failing(),
        MockCapture::granted(),
    )
    .await;

    let err = result.err().expect("start should fail");
    assert!(matches!(err, SyncError::SessionStart(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_connect_failure_is_fatal() {
    let session = MockSession::builder().rejecting_connect().build();
    let connector = MockConnector::new(session.clone());

    let result = RoomClient::start_with_token(
        &test_config("http://127.0.0.1:1"),
        test_token(),
        &connector,
        MockCapture::granted(),
    )
    .await;

    assert!(matches!(result, Err(SyncError::SessionStart(_))));
    assert_eq!(session.commands(), vec![SessionCommand::Connect]);
}
