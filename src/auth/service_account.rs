use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::RelayError;
use crate::credential::ServiceAccountKey;
use crate::utils::{hex_encode, now_epoch_seconds};

pub const SERVICE_ACCOUNT_SCOPE: &str = "https://www.googleapis.com/auth/generative-language.retriever https://www.googleapis.com/auth/cloud-platform";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const CACHE_EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("service account is missing {0}")]
    MissingField(&'static str),
    #[error("invalid service account private key: {0}")]
    InvalidKey(jsonwebtoken::errors::Error),
    #[error("failed to sign assertion: {0}")]
    Sign(jsonwebtoken::errors::Error),
    #[error("token exchange failed: {0}")]
    Exchange(#[from] RelayError),
    #[error("token exchange response missing access_token")]
    MissingAccessToken,
}

#[derive(Clone)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl AccessToken {
    pub fn authorization_header_value(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Builds the RS256-signed JWT bearer assertion for `key`, valid for one
/// hour from `now`.
pub fn sign_assertion(key: &ServiceAccountKey, now: i64) -> Result<String, SignerError> {
    if key.client_email.trim().is_empty() {
        return Err(SignerError::MissingField("client_email"));
    }
    if key.token_uri.trim().is_empty() {
        return Err(SignerError::MissingField("token_uri"));
    }
    if key.private_key.trim().is_empty() {
        return Err(SignerError::MissingField("private_key"));
    }

    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: SERVICE_ACCOUNT_SCOPE,
        aud: &key.token_uri,
        exp: now + ASSERTION_LIFETIME_SECS,
        iat: now,
    };
    let encoding_key =
        EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(SignerError::InvalidKey)?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(SignerError::Sign)
}

#[derive(Clone)]
struct CachedToken {
    token: AccessToken,
    expires_at: Instant,
}

/// Mints OAuth access tokens for service-account credentials.
///
/// Every call signs a fresh assertion and exchanges it, unless the token
/// cache was enabled with [`ServiceAccountSigner::with_token_cache`].
#[derive(Clone)]
pub struct ServiceAccountSigner {
    http: reqwest::Client,
    cache: Option<Arc<Mutex<HashMap<String, CachedToken>>>>,
}

impl std::fmt::Debug for ServiceAccountSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountSigner")
            .field("token_cache", &self.cache.is_some())
            .finish()
    }
}

impl ServiceAccountSigner {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http, cache: None }
    }

    pub fn with_token_cache(mut self) -> Self {
        self.cache = Some(Arc::new(Mutex::new(HashMap::new())));
        self
    }

    pub async fn access_token(&self, key: &ServiceAccountKey) -> Result<AccessToken, SignerError> {
        let Some(cache) = self.cache.as_ref() else {
            return self.exchange(key).await;
        };

        let cache_key = cache_key(key);
        {
            let cache = cache.lock().await;
            if let Some(entry) = cache.get(&cache_key) {
                if entry.expires_at > Instant::now() {
                    return Ok(entry.token.clone());
                }
            }
        }

        let token = self.exchange(key).await?;
        let lifetime = token
            .expires_in
            .unwrap_or(ASSERTION_LIFETIME_SECS as u64)
            .saturating_sub(CACHE_EXPIRY_MARGIN_SECS);
        if lifetime > 0 {
            let mut cache = cache.lock().await;
            cache.retain(|_, entry| entry.expires_at > Instant::now());
            cache.insert(
                cache_key,
                CachedToken {
                    token: token.clone(),
                    expires_at: Instant::now() + Duration::from_secs(lifetime),
                },
            );
        }
        Ok(token)
    }

    async fn exchange(&self, key: &ServiceAccountKey) -> Result<AccessToken, SignerError> {
        let assertion = sign_assertion(key, now_epoch_seconds())?;
        let params = [
            ("grant_type", JWT_BEARER_GRANT),
            ("assertion", assertion.as_str()),
        ];
        let parsed = crate::utils::http::send_checked_json::<TokenResponse>(
            self.http.post(key.token_uri.as_str()).form(&params),
        )
        .await?;
        let access_token = parsed
            .access_token
            .filter(|token| !token.trim().is_empty())
            .ok_or(SignerError::MissingAccessToken)?;
        Ok(AccessToken {
            access_token,
            expires_in: parsed.expires_in,
        })
    }
}

fn cache_key(key: &ServiceAccountKey) -> String {
    let mut hasher = Sha256::new();
    for part in [&key.client_email, &key.token_uri, &key.private_key] {
        hasher.update(part.as_bytes());
        hasher.update(b"\n");
    }
    hex_encode(&hasher.finalize())
}
