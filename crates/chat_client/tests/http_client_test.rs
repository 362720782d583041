//! Integration tests for HttpChatClient against a mock store

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chat_client::{BackendError, BranchBackend, BranchTarget, HttpChatClient, StreamBackend};
use chat_core::{Config, MessageId, VersionId};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, fetch_retries: u32) -> HttpChatClient {
    let mut config = Config::defaults();
    config.api_base = format!("{}/api", server.uri());
    config.api_key = Some("test-key".to_string());
    config.fetch_retries = fetch_retries;
    HttpChatClient::new(&config).expect("client")
}

#[tokio::test]
async fn test_resume_stream_sends_position_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/messages/m1/stream"))
        .and(query_param("fromPosition", "6"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "delta": "world",
            "newPosition": 11,
            "isComplete": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 0);
    let response = client
        .resume_stream(&MessageId::new("m1"), 6)
        .await
        .expect("resume");

    assert_eq!(response.delta, "world");
    assert_eq!(response.new_position, 11);
    assert!(response.is_complete);
}

#[tokio::test]
async fn test_resume_stream_is_not_retried_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/messages/m1/stream"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let err = client
        .resume_stream(&MessageId::new("m1"), 0)
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::Status { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_branch_query_retries_transient_failures() {
    let server = MockServer::start().await;
    let request_count = Arc::new(AtomicUsize::new(0));
    let counter = request_count.clone();

    Mock::given(method("GET"))
        .and(path("/api/messages/m1/branches"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            if count < 1 {
                ResponseTemplate::new(503)
            } else {
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "branches": [
                        {"id": "b1", "forkPointMessageId": "m1", "ordinal": 0, "isActive": true}
                    ],
                    "activeIndex": 0
                }))
            }
        })
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let snapshot = client
        .get_message_branches(&MessageId::new("m1"))
        .await
        .expect("branches");

    assert_eq!(snapshot.branches.len(), 1);
    assert_eq!(request_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_switch_branch_by_index_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/messages/m1/branches/active"))
        .and(body_json(serde_json::json!({ "branchIndex": 1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 0);
    let response = client
        .switch_branch(&MessageId::new("m1"), &BranchTarget::Index(1))
        .await
        .expect("switch");
    assert!(response.success);
}

#[tokio::test]
async fn test_stale_version_switch_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/messages/m1/versions/active"))
        .respond_with(ResponseTemplate::new(404).set_body_string("version v9 not found"))
        .mount(&server)
        .await;

    let client = client_for(&server, 0);
    let err = client
        .switch_version(&MessageId::new("m1"), &VersionId::new("v9"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::NotFound(ref body) if body.contains("v9")));
}

#[tokio::test]
async fn test_edit_and_retry_decode_new_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/messages/m1/edit"))
        .and(body_json(serde_json::json!({ "content": "fixed typo" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "newBranchId": "b2" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/messages/m2/retry"))
        .and(body_json(serde_json::json!({ "model": "model-b" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "newVersionId": "v3" })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 0);
    let edit = client
        .edit_message(&MessageId::new("m1"), "fixed typo")
        .await
        .expect("edit");
    assert_eq!(edit.new_branch_id.as_str(), "b2");

    let retry = client
        .retry_message(&MessageId::new("m2"), "model-b")
        .await
        .expect("retry");
    assert_eq!(retry.new_version_id.as_str(), "v3");
}

#[tokio::test]
async fn test_mark_complete_conflict_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/messages/m1/stream/complete"))
        .respond_with(ResponseTemplate::new(409).set_body_string("stream superseded"))
        .mount(&server)
        .await;

    let client = client_for(&server, 0);
    let err = client
        .mark_stream_complete(&MessageId::new("m1"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Rejected(_)));
}
