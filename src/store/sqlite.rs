use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::OptionalExtension;

use super::{ConfigStore, StoreError};
use crate::credential::ConfigData;

/// Single-row table `config (id = 1, data TEXT)` holding the JSON document.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = open_connection(path)?;
            init_schema(&conn)?;
            Ok(())
        })
        .await?
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self) -> Result<ConfigData, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<ConfigData, StoreError> {
            let conn = open_connection(path)?;
            init_schema(&conn)?;
            let raw: Option<String> = conn
                .query_row("SELECT data FROM config WHERE id = 1", [], |row| row.get(0))
                .optional()?;
            match raw {
                Some(raw) => Ok(serde_json::from_str(&raw)?),
                None => Ok(ConfigData::default()),
            }
        })
        .await?
    }

    async fn set(&self, data: ConfigData) -> Result<(), StoreError> {
        let path = self.path.clone();
        let serialized = serde_json::to_string(&data)?;
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = open_connection(path)?;
            init_schema(&conn)?;
            conn.execute(
                "INSERT INTO config (id, data) VALUES (1, ?1)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data",
                rusqlite::params![serialized],
            )?;
            Ok(())
        })
        .await?
    }
}

fn open_connection(path: PathBuf) -> Result<rusqlite::Connection, rusqlite::Error> {
    let conn = rusqlite::Connection::open(path)?;
    let _ = conn.busy_timeout(Duration::from_secs(5));
    let _ = conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
    Ok(conn)
}

fn init_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS config (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            data TEXT NOT NULL
        );",
    )
}
