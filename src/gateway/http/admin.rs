use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::{GatewayHttpState, error_response};
use crate::credential::{ConfigData, Credential};
use crate::store::StoreError;

#[derive(Debug, Serialize)]
struct ConfigView {
    keys: Vec<String>,
    #[serde(rename = "baseUrls")]
    base_urls: Vec<String>,
    readonly: bool,
}

pub(super) async fn get_config(
    State(state): State<GatewayHttpState>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = ensure_admin(&state, &headers) {
        return response;
    }

    let store = state.proxy.store();
    let data = match store.get().await {
        Ok(data) => data,
        Err(err) => {
            warn!(store = store.kind(), error = %err, "config load failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string(), None);
        }
    };

    let keys = data
        .keys
        .iter()
        .map(|raw| Credential::parse(raw).to_persisted())
        .collect();
    Json(ConfigView {
        keys,
        base_urls: data.base_urls,
        readonly: store.readonly(),
    })
    .into_response()
}

pub(super) async fn update_config(
    State(state): State<GatewayHttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = ensure_admin(&state, &headers) {
        return response;
    }

    let store = state.proxy.store();
    if store.readonly() {
        return read_only_response();
    }

    let data: ConfigData = match serde_json::from_slice(&body) {
        Ok(data) => data,
        Err(_) => {
            return error_response(StatusCode::BAD_REQUEST, "Invalid configuration body", None);
        }
    };
    let key_count = data.keys.len();

    match store.set(data).await {
        Ok(()) => {
            info!(store = store.kind(), keys = key_count, "configuration updated");
            Json(serde_json::json!({ "ok": true })).into_response()
        }
        Err(StoreError::ReadOnly) => read_only_response(),
        Err(err) => {
            warn!(store = store.kind(), error = %err, "config save failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string(), None)
        }
    }
}

fn read_only_response() -> Response {
    error_response(StatusCode::FORBIDDEN, "Configuration is read-only", None)
}

fn ensure_admin(state: &GatewayHttpState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.admin_secret.as_deref() else {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Admin API disabled",
            None,
        ));
    };

    let provided = extract_bearer(headers).unwrap_or_default();
    if provided.is_empty() || !secrets_match(&provided, expected) {
        return Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized", None));
    }
    Ok(())
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?
        .trim()
        .to_string();
    let rest = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))?;
    let token = rest.trim();
    (!token.is_empty()).then(|| token.to_string())
}

// Constant-time over fixed-length digests.
fn secrets_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
