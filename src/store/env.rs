use async_trait::async_trait;

use super::{ConfigStore, StoreError};
use crate::credential::ConfigData;
use crate::env::Env;

pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const GEMINI_API_BASE_URL_VAR: &str = "GEMINI_API_BASE_URL";

/// Read-only snapshot of `GEMINI_API_KEY` / `GEMINI_API_BASE_URL` taken at
/// startup.
#[derive(Debug, Clone)]
pub struct EnvStore {
    data: ConfigData,
}

impl EnvStore {
    pub fn from_env(env: &Env) -> Self {
        Self {
            data: ConfigData::new(
                env.get_list(GEMINI_API_KEY_VAR),
                env.get_list(GEMINI_API_BASE_URL_VAR),
            ),
        }
    }
}

#[async_trait]
impl ConfigStore for EnvStore {
    fn kind(&self) -> &'static str {
        "env"
    }

    fn readonly(&self) -> bool {
        true
    }

    async fn get(&self) -> Result<ConfigData, StoreError> {
        Ok(self.data.clone())
    }

    async fn set(&self, _data: ConfigData) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
    }
}
