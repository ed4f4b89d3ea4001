//! # Persistence
//!
//! Keeps the exchange alive across restarts.
//!
//! ## Snapshot
//!
//! Everything durable lives in one JSON document:
//! - **passwords**: credential -> person
//! - **secretSanta**: person -> [giftee, wish list]
//! - **lastInitialized**: when the current draw was generated
//!
//! The snapshot is read in full at startup and written in full after every mutation. No deltas.
//!
//! ## Backends
//!
//! Picked once at startup, invisible to everything else.
//! - **File**: pretty printed JSON in `data/secret-santa.json`, good for local runs
//! - **Redis**: 1 key holding the same JSON, see [`crate::database`]
//!
//! Failures are returned here and logged by the store. They never fail a request, the in-memory state stays
//! authoritative until the next successful save.
use std::{collections::BTreeMap, io::ErrorKind, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::{fs, task};
use tracing::{error, info};

use crate::{config::Config, database::RedisStore};

pub const DATA_FILE: &str = "secret-santa.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub passwords: BTreeMap<String, String>,
    pub secret_santa: BTreeMap<String, (String, Vec<String>)>,
    pub last_initialized: DateTime<Utc>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            passwords: BTreeMap::new(),
            secret_santa: BTreeMap::new(),
            last_initialized: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Write task failed: {0}")]
    Task(#[from] task::JoinError),
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn load(&self) -> Result<Option<Snapshot>, PersistenceError>;

    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;

    async fn clear(&self) -> Result<(), PersistenceError>;
}

pub struct FileStore {
    dir: PathBuf,
    path: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(DATA_FILE);

        Self { dir, path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for FileStore {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir).await?;

        let json = serde_json::to_vec_pretty(snapshot)?;
        let (dir, path) = (self.dir.clone(), self.path.clone());

        // every write gets its own temp file, readers never see a half written snapshot
        task::spawn_blocking(move || -> Result<(), PersistenceError> {
            let temp = NamedTempFile::new_in(&dir)?;
            std::fs::write(temp.path(), json)?;
            temp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await??;

        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub async fn connect(config: &Config) -> Arc<dyn SnapshotStore> {
    if let Some(kv_url) = &config.kv_url {
        match RedisStore::connect(kv_url).await {
            Ok(store) => {
                info!("Redis initialized (KV_URL found)");
                return Arc::new(store);
            }
            Err(e) => error!("Failed to connect to Redis, falling back to disk: {e}"),
        }
    } else {
        info!("KV_URL not found, using local file storage");
    }

    Arc::new(FileStore::new(&config.data_dir))
}
