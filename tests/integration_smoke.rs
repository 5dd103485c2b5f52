#![cfg(feature = "integration")]

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use gemini_relay::Env;
use gemini_relay::gateway::{FailoverProxy, GatewayHttpState, router};
use gemini_relay::store::EnvStore;
use serde_json::{Value, json};
use tower::util::ServiceExt;

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[tokio::test]
async fn generate_content_through_relay_smoke() {
    if env_nonempty("GEMINI_API_KEY").is_none() {
        return;
    }
    let model = env_nonempty("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.0-flash".to_string());

    let store = Arc::new(EnvStore::from_env(&Env::default()));
    let proxy = FailoverProxy::new(store, reqwest::Client::new());
    let app = router(GatewayHttpState::new(proxy));

    let request = Request::builder()
        .method("POST")
        .uri(format!("/v1beta/models/{model}:generateContent"))
        .header("content-type", "application/json")
        .header("x-goog-api-key", "integration-smoke")
        .body(Body::from(
            json!({
                "contents": [{"parts": [{"text": "Reply with the single word: ok"}]}],
                "generationConfig": {"maxOutputTokens": 16, "temperature": 0.0},
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["candidates"].is_array(), "unexpected body: {body}");
}
