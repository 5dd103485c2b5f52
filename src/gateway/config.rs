use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::env::Env;
use crate::store::{ConfigStore, EnvStore, FileStore, StoreError};
use crate::{RelayError, Result};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8787";
pub const DEFAULT_ADMIN_SECRET_ENV: &str = "CLIENT_KEY_VALIDATION_SECRET";
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Settings for `gemini-relay serve`, usually read from a TOML file and
/// then overridden by command-line flags.
///
/// ```toml
/// listen = "0.0.0.0:8787"
/// attempt_timeout_secs = 120
///
/// [storage]
/// backend = "sqlite"
/// path = "relay.sqlite"
/// ```
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewaySettings {
    pub listen: String,
    /// Secret for caller tokens and the `/_config` bearer. Prefer
    /// `admin_secret_env` over putting it in the file.
    pub admin_secret: Option<String>,
    pub admin_secret_env: String,
    pub attempt_timeout_secs: u64,
    pub max_body_bytes: usize,
    pub oauth_token_cache: bool,
    pub json_logs: bool,
    pub storage: StorageSettings,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            admin_secret: None,
            admin_secret_env: DEFAULT_ADMIN_SECRET_ENV.to_string(),
            attempt_timeout_secs: 300,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            oauth_token_cache: false,
            json_logs: false,
            storage: StorageSettings::Env,
        }
    }
}

impl std::fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("listen", &self.listen)
            .field("admin_secret", &self.admin_secret.as_ref().map(|_| "<redacted>"))
            .field("admin_secret_env", &self.admin_secret_env)
            .field("attempt_timeout_secs", &self.attempt_timeout_secs)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("oauth_token_cache", &self.oauth_token_cache)
            .field("json_logs", &self.json_logs)
            .field("storage", &self.storage)
            .finish()
    }
}

impl GatewaySettings {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| RelayError::InvalidConfig(err.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Explicit secret first, then the configured environment variable.
    pub fn resolve_admin_secret(&self, env: &Env) -> Option<String> {
        self.admin_secret
            .as_deref()
            .map(str::trim)
            .filter(|secret| !secret.is_empty())
            .map(str::to_string)
            .or_else(|| env.get(&self.admin_secret_env))
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case", deny_unknown_fields)]
pub enum StorageSettings {
    /// `GEMINI_API_KEY` / `GEMINI_API_BASE_URL`, read once. Read-only.
    Env,
    StateFile {
        path: PathBuf,
    },
    Sqlite {
        path: PathBuf,
    },
    Redis {
        url: String,
        #[serde(default)]
        prefix: Option<String>,
    },
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env => f.write_str("Env"),
            Self::StateFile { path } => f.debug_struct("StateFile").field("path", path).finish(),
            Self::Sqlite { path } => f.debug_struct("Sqlite").field("path", path).finish(),
            Self::Redis { prefix, .. } => f
                .debug_struct("Redis")
                .field("url", &"<redacted>")
                .field("prefix", prefix)
                .finish(),
        }
    }
}

impl StorageSettings {
    pub async fn open(&self, env: &Env) -> std::result::Result<Arc<dyn ConfigStore>, StoreError> {
        match self {
            Self::Env => Ok(Arc::new(EnvStore::from_env(env))),
            Self::StateFile { path } => Ok(Arc::new(FileStore::new(path))),
            #[cfg(feature = "gateway-store-sqlite")]
            Self::Sqlite { path } => {
                let store = crate::store::SqliteStore::new(path);
                store.init().await?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "gateway-store-sqlite"))]
            Self::Sqlite { .. } => Err(StoreError::Disabled("sqlite")),
            #[cfg(feature = "gateway-store-redis")]
            Self::Redis { url, prefix } => {
                let mut store = crate::store::RedisStore::new(url)?;
                if let Some(prefix) = prefix {
                    store = store.with_prefix(prefix.clone());
                }
                store.ping().await?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "gateway-store-redis"))]
            Self::Redis { .. } => Err(StoreError::Disabled("redis")),
        }
    }
}
