//! # Redis
//!
//! Remote KV backend, used whenever `KV_URL` is configured.
//!
//! ## Requirements
//!
//! - Survive container restarts and redeploys where the local disk does not
//! - Tiny dataset, a family sized snapshot is a few kilobytes
//! - Read once at startup, written on every mutation
//!
//! ## Implementation
//!
//! - 1 key, `secret-santa:data`, holding the whole snapshot as a JSON string
//! - `GET` to load, `SET` to save, `DEL` to clear
//! - No partial writes, no hashes, the snapshot is the unit of durability
//! - Connection manager reconnects on its own, one retry per command
use std::time::Duration;

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client, RedisError,
    aio::{ConnectionManager, ConnectionManagerConfig},
};

use crate::persistence::{PersistenceError, Snapshot, SnapshotStore};

pub const KV_KEY: &str = "secret-santa:data";

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, RedisError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_secs(2));

    let client = Client::open(redis_url)?;

    client.get_connection_manager_with_config(config).await
}

pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, PersistenceError> {
        Ok(Self {
            connection: init_redis(redis_url).await?,
        })
    }
}

#[async_trait]
impl SnapshotStore for RedisStore {
    fn name(&self) -> &'static str {
        "Redis"
    }

    async fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(KV_KEY).await?;

        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(PersistenceError::from)
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(snapshot)?;

        let mut connection = self.connection.clone();
        let _: () = connection.set(KV_KEY, json).await?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        let mut connection = self.connection.clone();
        let _: usize = connection.del(KV_KEY).await?;

        Ok(())
    }
}
