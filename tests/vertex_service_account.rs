use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use gemini_relay::credential::ConfigData;
use gemini_relay::gateway::{ConfiguredOrder, FailoverProxy, GatewayHttpState, router};
use gemini_relay::store::MemoryStore;
use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::{Value, json};
use tower::util::ServiceExt;

const PRIVATE_KEY_PEM: &str = include_str!("fixtures/service_account_key.pem");
const VERTEX_PATH: &str =
    "/v1/projects/proj1/locations/global/publishers/google/models/gemini-pro:generateContent";

fn service_account_json(token_uri: &str) -> String {
    json!({
        "type": "service_account",
        "project_id": "proj1",
        "private_key_id": "fixture",
        "private_key": PRIVATE_KEY_PEM,
        "client_email": "relay@proj1.iam.gserviceaccount.com",
        "token_uri": token_uri,
    })
    .to_string()
}

fn app_with(data: ConfigData) -> axum::Router {
    let proxy = FailoverProxy::new(Arc::new(MemoryStore::new(data)), reqwest::Client::new())
        .with_candidate_order(ConfiguredOrder);
    router(GatewayHttpState::new(proxy))
}

fn generate_request(path: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header("x-goog-api-key", "caller-1")
        .body(Body::from(r#"{"contents":[]}"#))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn service_account_requests_are_rewritten_and_signed() {
    if gemini_relay::utils::test_support::should_skip_httpmock() {
        return;
    }

    let server = MockServer::start_async().await;
    let token_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/token")
                .body_includes("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"access_token": "ya29.fixture", "expires_in": 3600}));
        })
        .await;
    let generate_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(VERTEX_PATH)
                .header("authorization", "Bearer ya29.fixture")
                .header_missing("x-goog-api-key")
                .body(r#"{"contents":[]}"#);
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"candidates":[]}"#);
        })
        .await;

    let app = app_with(ConfigData::new(
        vec![service_account_json(&server.url("/token"))],
        vec![server.url("/")],
    ));
    let response = app
        .oneshot(generate_request("/v1beta/models/gemini-pro:generateContent"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"candidates": []}));
    token_mock.assert_calls_async(1).await;
    generate_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn failed_token_exchange_moves_to_api_key() {
    if gemini_relay::utils::test_support::should_skip_httpmock() {
        return;
    }

    let server = MockServer::start_async().await;
    let token_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/token");
            then.status(400)
                .header("content-type", "application/json")
                .json_body(json!({"error": "invalid_grant"}));
        })
        .await;
    let vertex_mock = server
        .mock_async(|when, then| {
            when.method(POST).path(VERTEX_PATH);
            then.status(200).body("{}");
        })
        .await;
    let studio_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-pro:generateContent")
                .header("x-goog-api-key", "key-b")
                .header_missing("authorization");
            then.status(200).body(r#"{"from":"api-key"}"#);
        })
        .await;

    let app = app_with(ConfigData::new(
        vec![service_account_json(&server.url("/token")), "key-b".to_string()],
        vec![server.url("/"), server.url("/")],
    ));
    let response = app
        .oneshot(generate_request("/v1beta/models/gemini-pro:generateContent"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"from": "api-key"}));
    token_mock.assert_calls_async(1).await;
    vertex_mock.assert_calls_async(0).await;
    studio_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn path_without_model_fails_the_service_account_candidate() {
    if gemini_relay::utils::test_support::should_skip_httpmock() {
        return;
    }

    let server = MockServer::start_async().await;
    let token_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/token");
            then.status(200)
                .json_body(json!({"access_token": "ya29.fixture"}));
        })
        .await;

    let app = app_with(ConfigData::new(
        vec![service_account_json(&server.url("/token"))],
        vec![server.url("/")],
    ));
    let response = app.oneshot(generate_request("/v1beta/files")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "All API keys failed");
    assert!(
        body["message"].as_str().unwrap().contains("models"),
        "unexpected message: {body}"
    );
    token_mock.assert_calls_async(0).await;
}
