use std::sync::Arc;
use std::time::Duration;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue, Method};
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use super::GatewayError;
use super::upstream::{
    AIG_METADATA_HEADER, CLIENT_KEY_HEADER, aig_metadata, forward_headers, target_url,
};
use super::vertex::{DEFAULT_VERTEX_LOCATION, PathRewriteError, rewrite_path_for_vertex_ai};
use crate::auth::{ServiceAccountSigner, SignerError, validate_client_token};
use crate::credential::{Credential, KeyConfig, hash_key, resolve_key_configs};
use crate::store::ConfigStore;
use crate::utils::now_epoch_seconds;

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Failure of a single candidate. Never terminal: the proxy moves on.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Path(#[from] PathRewriteError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error("{0}")]
    Url(String),
    #[error("credential is not a valid header value")]
    InvalidHeader,
    #[error("{0}")]
    Transport(reqwest::Error),
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },
}

/// Decides the order candidates are tried in for one request.
pub trait CandidateOrder: Send + Sync {
    fn arrange(&self, candidates: &mut [KeyConfig]);
}

/// Uniform random permutation from OS randomness.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomOrder;

impl CandidateOrder for RandomOrder {
    fn arrange(&self, candidates: &mut [KeyConfig]) {
        shuffle(candidates);
    }
}

/// Keeps the configured order.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfiguredOrder;

impl CandidateOrder for ConfiguredOrder {
    fn arrange(&self, _candidates: &mut [KeyConfig]) {}
}

/// Fisher-Yates. Leaves the slice untouched if the OS RNG is unavailable.
pub fn shuffle<T>(items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let Some(j) = random_below(i + 1) else {
            warn!("os randomness unavailable; keeping candidate order");
            return;
        };
        items.swap(i, j);
    }
}

fn random_below(bound: usize) -> Option<usize> {
    let bound = bound as u64;
    let zone = u64::MAX - (u64::MAX % bound);
    loop {
        let mut buf = [0u8; 8];
        getrandom::fill(&mut buf).ok()?;
        let value = u64::from_le_bytes(buf);
        if value < zone {
            return Some((value % bound) as usize);
        }
    }
}

/// One inbound request, with the body already buffered.
#[derive(Clone, Debug)]
pub struct ProxyRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A request that passed the credential and caller checks.
pub struct Admission {
    candidates: Vec<KeyConfig>,
    client_key: String,
}

impl std::fmt::Debug for Admission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Admission")
            .field("candidates", &self.candidates.len())
            .field("client_key", &"<redacted>")
            .finish()
    }
}

impl Admission {
    pub fn candidates(&self) -> &[KeyConfig] {
        &self.candidates
    }
}

#[derive(Debug)]
pub struct ProxyOutcome {
    pub response: reqwest::Response,
    pub attempts: usize,
}

/// Tries each configured credential in turn until one yields a response
/// below 500.
#[derive(Clone)]
pub struct FailoverProxy {
    store: Arc<dyn ConfigStore>,
    http: reqwest::Client,
    signer: ServiceAccountSigner,
    client_secret: Option<String>,
    order: Arc<dyn CandidateOrder>,
    attempt_timeout: Duration,
}

impl std::fmt::Debug for FailoverProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverProxy")
            .field("store", &self.store.kind())
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl FailoverProxy {
    pub fn new(store: Arc<dyn ConfigStore>, http: reqwest::Client) -> Self {
        Self {
            store,
            signer: ServiceAccountSigner::new(http.clone()),
            http,
            client_secret: None,
            order: Arc::new(RandomOrder),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Requires callers to present a token signed with `secret`.
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_candidate_order(mut self, order: impl CandidateOrder + 'static) -> Self {
        self.order = Arc::new(order);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_token_cache(mut self) -> Self {
        self.signer = self.signer.with_token_cache();
        self
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Loads the credential list and checks the caller key. Runs before the
    /// inbound body is read.
    pub async fn admit(&self, headers: &HeaderMap) -> Result<Admission, GatewayError> {
        let data = self.store.get().await?;
        let candidates = resolve_key_configs(&data);
        if candidates.is_empty() {
            return Err(GatewayError::NoCredentials);
        }

        // Non-ASCII bytes still count as a presented key; validation rejects them.
        let client_key = headers
            .get(CLIENT_KEY_HEADER)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .filter(|value| !value.is_empty())
            .ok_or(GatewayError::MissingClientKey)?;

        if let Some(secret) = self.client_secret.as_deref() {
            if let Err(err) = validate_client_token(&client_key, secret, now_epoch_seconds()) {
                debug!(error = %err, "rejected caller token");
                return Err(GatewayError::InvalidClientKey);
            }
        }

        Ok(Admission {
            candidates,
            client_key,
        })
    }

    pub async fn forward(
        &self,
        admission: Admission,
        request: &ProxyRequest,
    ) -> Result<ProxyOutcome, GatewayError> {
        let Admission {
            mut candidates,
            client_key,
        } = admission;
        self.order.arrange(&mut candidates);

        let mut last_error = String::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            let key_hash = hash_key(&candidate.credential);
            let result = tokio::time::timeout(
                self.attempt_timeout,
                self.attempt(candidate, &key_hash, request, &client_key),
            )
            .await
            .unwrap_or(Err(AttemptError::Timeout(self.attempt_timeout)));

            let err = match result {
                Ok(response) if response.status().as_u16() < 500 => {
                    return Ok(ProxyOutcome {
                        response,
                        attempts: idx + 1,
                    });
                }
                Ok(response) => {
                    let status = response.status();
                    AttemptError::Status {
                        status: status.as_u16(),
                        reason: status.canonical_reason().unwrap_or_default().to_string(),
                    }
                }
                Err(err) => err,
            };

            warn!(
                key = %&key_hash[..12],
                kind = candidate.credential.kind(),
                attempt = idx + 1,
                error = %err,
                "upstream candidate failed"
            );
            last_error = err.to_string();
        }

        Err(GatewayError::Exhausted { last_error })
    }

    pub async fn handle(&self, request: &ProxyRequest) -> Result<ProxyOutcome, GatewayError> {
        let admission = self.admit(&request.headers).await?;
        self.forward(admission, request).await
    }

    async fn attempt(
        &self,
        candidate: &KeyConfig,
        key_hash: &str,
        request: &ProxyRequest,
        client_key: &str,
    ) -> Result<reqwest::Response, AttemptError> {
        let mut headers = forward_headers(&request.headers);
        let path = match &candidate.credential {
            Credential::ApiKey(key) => {
                let value = HeaderValue::from_str(key).map_err(|_| AttemptError::InvalidHeader)?;
                headers.insert(CLIENT_KEY_HEADER, value);
                request.path.clone()
            }
            Credential::ServiceAccount(key) => {
                let path = rewrite_path_for_vertex_ai(
                    &request.path,
                    &key.project_id,
                    DEFAULT_VERTEX_LOCATION,
                )?;
                let token = self.signer.access_token(key).await?;
                let value = HeaderValue::from_str(&token.authorization_header_value())
                    .map_err(|_| AttemptError::InvalidHeader)?;
                headers.insert(AUTHORIZATION, value);
                path
            }
        };
        if let Some(metadata) = aig_metadata(client_key, key_hash) {
            headers.insert(AIG_METADATA_HEADER, metadata);
        }

        let url = target_url(&candidate.base_url, &path, request.query.as_deref())
            .map_err(AttemptError::Url)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(headers);
        if request.method != Method::GET && request.method != Method::HEAD {
            builder = builder.body(request.body.clone());
        }
        builder
            .send()
            .await
            .map_err(|err| AttemptError::Transport(err.without_url()))
    }
}
