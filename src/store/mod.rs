//! Persistence for the raw credential lists.
//!
//! Every backend stores one [`ConfigData`] value and overwrites it whole on
//! update. Nothing is cached; callers read the store on every request.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::credential::ConfigData;

mod env;
mod state_file;

#[cfg(feature = "gateway-store-redis")]
mod redis;
#[cfg(feature = "gateway-store-sqlite")]
mod sqlite;

pub use env::{EnvStore, GEMINI_API_BASE_URL_VAR, GEMINI_API_KEY_VAR};
pub use state_file::FileStore;

#[cfg(feature = "gateway-store-redis")]
pub use self::redis::RedisStore;
#[cfg(feature = "gateway-store-sqlite")]
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration is read-only")]
    ReadOnly,
    #[error("storage backend `{0}` is not enabled in this build")]
    Disabled(&'static str),
    #[error("config io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config json invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[cfg(feature = "gateway-store-sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[cfg(feature = "gateway-store-redis")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Short backend name for logs.
    fn kind(&self) -> &'static str;

    fn readonly(&self) -> bool {
        false
    }

    async fn get(&self) -> Result<ConfigData, StoreError>;

    async fn set(&self, data: ConfigData) -> Result<(), StoreError>;
}

/// Process-local store, used when embedding the gateway and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<ConfigData>,
}

impl MemoryStore {
    pub fn new(data: ConfigData) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn get(&self) -> Result<ConfigData, StoreError> {
        Ok(self.data.read().await.clone())
    }

    async fn set(&self, data: ConfigData) -> Result<(), StoreError> {
        *self.data.write().await = data;
        Ok(())
    }
}
