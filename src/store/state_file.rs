use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use super::{ConfigStore, StoreError};
use crate::credential::ConfigData;

/// JSON file holding `{"keys": [...], "baseUrls": [...]}`. A missing file
/// reads as an empty configuration.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    fn kind(&self) -> &'static str {
        "state_file"
    }

    async fn get(&self) -> Result<ConfigData, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ConfigData::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, data: ConfigData) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let payload = serde_json::to_vec_pretty(&data)?;
        let tmp_path = self.path.with_extension("tmp");
        if fs::write(&tmp_path, &payload).await.is_err() {
            fs::write(&self.path, &payload).await?;
            return Ok(());
        }

        if fs::rename(&tmp_path, &self.path).await.is_err() {
            fs::write(&self.path, &payload).await?;
            let _ = fs::remove_file(&tmp_path).await;
        }
        Ok(())
    }
}
