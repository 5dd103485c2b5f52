use async_trait::async_trait;
use redis::AsyncCommands;

use super::{ConfigStore, StoreError};
use crate::credential::ConfigData;

/// Stores the JSON document under `{prefix}:config`.
#[derive(Clone, Debug)]
pub struct RedisStore {
    client: redis::Client,
    prefix: String,
}

impl RedisStore {
    pub fn new(url: impl AsRef<str>) -> Result<Self, StoreError> {
        Ok(Self {
            client: redis::Client::open(url.as_ref())?,
            prefix: "gemini_relay".to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: Option<String> = conn.get(format!("{}:__ping__", self.prefix)).await?;
        Ok(())
    }

    fn key_config(&self) -> String {
        format!("{}:config", self.prefix)
    }
}

#[async_trait]
impl ConfigStore for RedisStore {
    fn kind(&self) -> &'static str {
        "redis"
    }

    async fn get(&self) -> Result<ConfigData, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.key_config()).await?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(ConfigData::default()),
        }
    }

    async fn set(&self, data: ConfigData) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(&data)?;
        let mut conn = self.connection().await?;
        let () = conn.set(self.key_config(), serialized).await?;
        Ok(())
    }
}
