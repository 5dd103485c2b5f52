//! Upstream credentials and their resolution from the persisted config.
//!
//! A persisted key is either a raw API key string or the JSON text of a
//! Google service-account key file. The shape is inspected exactly once, in
//! [`resolve_key_configs`]; everything downstream matches on [`Credential`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::utils::hex_encode;

pub const GENERATIVE_LANGUAGE_BASE_URL: &str = "https://generativelanguage.googleapis.com/";
pub const VERTEX_AI_BASE_URL: &str = "https://aiplatform.googleapis.com/";

const SERVICE_ACCOUNT_TYPE: &str = "service_account";

/// Persisted form of the credential list. `keys[i]` pairs with
/// `base_urls[i]`; a missing or blank base URL falls back to the
/// credential's default origin.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigData {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default, rename = "baseUrls")]
    pub base_urls: Vec<String>,
}

impl std::fmt::Debug for ConfigData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigData")
            .field("keys", &format_args!("<{} redacted>", self.keys.len()))
            .field("base_urls", &self.base_urls)
            .finish()
    }
}

impl ConfigData {
    pub fn new(keys: Vec<String>, base_urls: Vec<String>) -> Self {
        Self { keys, base_urls }
    }
}

/// A Google service-account key file.
///
/// The parsed object is kept as-is (field order included) and is what gets
/// persisted and hashed; the typed fields are read from it once.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
    source: Map<String, Value>,
}

#[derive(Deserialize)]
struct ServiceAccountFields {
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    client_email: String,
    #[serde(default)]
    private_key: String,
    #[serde(default)]
    token_uri: String,
}

impl ServiceAccountKey {
    /// Reads the typed fields out of a key-file object. Fails when one of
    /// them is present with a non-string value.
    pub fn from_json(source: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let fields: ServiceAccountFields =
            serde_json::from_value(Value::Object(source.clone()))?;
        Ok(Self {
            project_id: fields.project_id,
            client_email: fields.client_email,
            private_key: fields.private_key,
            token_uri: fields.token_uri,
            source,
        })
    }

    /// Compact JSON of the key file in its original field order.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.source).unwrap_or_default()
    }
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    ServiceAccount(Box<ServiceAccountKey>),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Self::ServiceAccount(key) => f.debug_tuple("ServiceAccount").field(key).finish(),
        }
    }
}

impl Credential {
    /// Classifies one persisted key string.
    pub fn parse(raw: &str) -> Self {
        let Ok(Value::Object(object)) = serde_json::from_str::<Value>(raw) else {
            return Self::ApiKey(raw.to_string());
        };
        let is_service_account = object
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|kind| kind == SERVICE_ACCOUNT_TYPE);
        if !is_service_account {
            return Self::ApiKey(raw.to_string());
        }
        match ServiceAccountKey::from_json(object) {
            Ok(key) => Self::ServiceAccount(Box::new(key)),
            Err(_) => Self::ApiKey(raw.to_string()),
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::ApiKey(_) => GENERATIVE_LANGUAGE_BASE_URL,
            Self::ServiceAccount(_) => VERTEX_AI_BASE_URL,
        }
    }

    /// The string stored for this credential: the raw key, or compact JSON
    /// for a service account.
    pub fn to_persisted(&self) -> String {
        match self {
            Self::ApiKey(key) => key.clone(),
            Self::ServiceAccount(key) => key.to_json_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApiKey(_) => "api_key",
            Self::ServiceAccount(_) => "service_account",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyConfig {
    pub credential: Credential,
    pub base_url: String,
}

pub fn resolve_key_configs(data: &ConfigData) -> Vec<KeyConfig> {
    data.keys
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let credential = Credential::parse(raw);
            let base_url = data
                .base_urls
                .get(idx)
                .map(|url| url.trim())
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| credential.default_base_url().to_string());
            KeyConfig {
                credential,
                base_url,
            }
        })
        .collect()
}

/// Hex SHA-256 of the persisted form. Identifies a credential in logs and
/// upstream metadata without revealing it.
pub fn hash_key(credential: &Credential) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credential.to_persisted().as_bytes());
    hex_encode(&hasher.finalize())
}
