use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::config::DEFAULT_MAX_BODY_BYTES;
use super::upstream::sanitize_response_headers;
use super::{FailoverProxy, GatewayError, ProxyRequest};

mod admin;

#[derive(Clone)]
pub struct GatewayHttpState {
    proxy: Arc<FailoverProxy>,
    admin_secret: Option<String>,
    max_body_bytes: usize,
}

impl std::fmt::Debug for GatewayHttpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayHttpState")
            .field("proxy", &self.proxy)
            .field("admin_secret", &self.admin_secret.as_ref().map(|_| "<redacted>"))
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl GatewayHttpState {
    pub fn new(proxy: FailoverProxy) -> Self {
        Self {
            proxy: Arc::new(proxy),
            admin_secret: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Enables the `/_config` endpoints behind `Authorization: Bearer`.
    pub fn with_admin_secret(mut self, secret: impl Into<String>) -> Self {
        self.admin_secret = Some(secret.into());
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes.max(1);
        self
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

pub fn router(state: GatewayHttpState) -> Router {
    Router::new()
        .route(
            "/_config",
            get(admin::get_config).post(admin::update_config),
        )
        .fallback(handle_proxy)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(status: StatusCode, error: &str, message: Option<&str>) -> Response {
    (status, Json(ErrorBody { error, message })).into_response()
}

fn allow_any_origin(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
}

fn gateway_error_response(err: &GatewayError) -> Response {
    let mut response = error_response(err.status(), &err.to_string(), err.message());
    allow_any_origin(response.headers_mut());
    response
}

fn passthrough(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    sanitize_response_headers(&mut headers);
    allow_any_origin(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

async fn handle_proxy(State(state): State<GatewayHttpState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();

    let admission = match state.proxy.admit(&parts.headers).await {
        Ok(admission) => admission,
        Err(err) => {
            match &err {
                GatewayError::Store(source) => {
                    warn!(store = state.proxy.store().kind(), error = %source, "config load failed");
                }
                _ => info!(%method, %path, status = err.status().as_u16(), "request rejected"),
            }
            return gateway_error_response(&err);
        }
    };

    let declared_len = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > state.max_body_bytes) {
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large", None);
    }
    let body = match to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(err) => {
            warn!(%method, %path, error = %err, "failed to read request body");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body", None);
        }
    };

    let proxy_request = ProxyRequest {
        method: parts.method,
        path: path.clone(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    };

    match state.proxy.forward(admission, &proxy_request).await {
        Ok(outcome) => {
            info!(
                %method,
                %path,
                status = outcome.response.status().as_u16(),
                attempts = outcome.attempts,
                "proxied request"
            );
            passthrough(outcome.response)
        }
        Err(err) => {
            warn!(%method, %path, error = %err, detail = err.message().unwrap_or_default(), "request failed");
            gateway_error_response(&err)
        }
    }
}
