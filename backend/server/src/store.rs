//! # Assignment Store
//!
//! Single in-process source of truth for credentials, assignments and wish lists.
//!
//! - Maps are private, callers go through lookups, [`AssignmentStore::set_wish_list`],
//!   [`AssignmentStore::replace_all`] and [`AssignmentStore::clear_all`]
//! - Every mutation writes the full snapshot before returning
//! - Persistence failures are logged, memory stays authoritative
//! - The state lock is never held across backend I/O, same person writes are last-writer-wins
//! - Saves are serialized and always write the latest state, so the durable copy never falls behind memory
use std::sync::Arc;

use chrono::Utc;
use draw::{Draw, Strategy};
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{error, info, warn};

use crate::persistence::{Snapshot, SnapshotStore};

pub const MAX_WISHES: usize = 5;

pub struct AssignmentStore {
    state: RwLock<Snapshot>,
    backend: Arc<dyn SnapshotStore>,
    save_guard: Mutex<()>,
    initialized: OnceCell<()>,
}

impl AssignmentStore {
    pub fn new(backend: Arc<dyn SnapshotStore>) -> Self {
        Self {
            state: RwLock::new(Snapshot::default()),
            backend,
            save_guard: Mutex::new(()),
            initialized: OnceCell::new(),
        }
    }

    /// Restores the last snapshot, or draws the default participants when there is none.
    /// Runs at most once per store.
    pub async fn ensure_initialized(&self, defaults: &[String], strategy: Strategy) {
        self.initialized
            .get_or_init(|| self.bootstrap(defaults, strategy))
            .await;
    }

    async fn bootstrap(&self, defaults: &[String], strategy: Strategy) {
        match self.backend.load().await {
            Ok(Some(snapshot)) => {
                info!(
                    "Restored {} assignments from {}",
                    snapshot.secret_santa.len(),
                    self.backend.name()
                );
                self.adopt(snapshot).await;
                return;
            }
            Ok(None) => {}
            Err(e) => {
                error!("Error loading data from {}: {e}", self.backend.name());
                warn!(
                    "Serving an empty exchange, durable data was left untouched. Restart once {} is reachable",
                    self.backend.name()
                );
                return;
            }
        }

        if !self.is_empty().await {
            return;
        }

        if defaults.is_empty() {
            warn!("No stored assignments and no default participants, waiting for /init");
            return;
        }

        info!("Initializing with {} default participants...", defaults.len());
        match draw::generate(defaults, strategy) {
            Ok(draw) => self.replace_all(draw).await,
            Err(e) => error!("Error during auto-initialization: {e}"),
        }
    }

    pub async fn adopt(&self, snapshot: Snapshot) {
        *self.state.write().await = snapshot;
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        let state = self.state.read().await;

        state.passwords.is_empty() && state.secret_santa.is_empty()
    }

    pub async fn person_for_credential(&self, credential: &str) -> Option<String> {
        self.state.read().await.passwords.get(credential).cloned()
    }

    pub async fn giftee_of(&self, person: &str) -> Option<String> {
        self.state
            .read()
            .await
            .secret_santa
            .get(person)
            .map(|(giftee, _)| giftee.clone())
    }

    pub async fn wish_list(&self, person: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .secret_santa
            .get(person)
            .map(|(_, wishes)| wishes.clone())
            .unwrap_or_default()
    }

    /// Overwrites the wish list of a known person. Unknown people are a no-op and return `false`.
    pub async fn set_wish_list(&self, person: &str, wishes: Vec<String>) -> bool {
        {
            let mut state = self.state.write().await;

            let Some((_, current)) = state.secret_santa.get_mut(person) else {
                return false;
            };
            *current = wishes;
        }

        self.persist().await;
        true
    }

    /// Swaps in a fresh draw. Wish lists start empty.
    pub async fn replace_all(&self, draw: Draw) {
        if draw.has_credential_collision() {
            warn!("Credential collision in new draw, one participant has no credential");
        }

        let snapshot = Snapshot {
            passwords: draw.credentials,
            secret_santa: draw
                .assignments
                .into_iter()
                .map(|(giver, giftee)| (giver, (giftee, Vec::new())))
                .collect(),
            last_initialized: Utc::now(),
        };

        *self.state.write().await = snapshot;

        self.persist().await;
    }

    pub async fn clear_all(&self) {
        let _guard = self.save_guard.lock().await;

        *self.state.write().await = Snapshot::default();

        match self.backend.clear().await {
            Ok(()) => info!("Cleared data from {}", self.backend.name()),
            Err(e) => error!("Error clearing data from {}: {e}", self.backend.name()),
        }
    }

    /// (person, credential) pairs sorted by person.
    pub async fn credentials(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .state
            .read()
            .await
            .passwords
            .iter()
            .map(|(credential, person)| (person.clone(), credential.clone()))
            .collect();

        pairs.sort();
        pairs
    }

    /// Writes the current state. The snapshot is taken after the save guard, so a later save
    /// always carries every mutation that finished before it.
    async fn persist(&self) {
        let _guard = self.save_guard.lock().await;

        let snapshot = self.snapshot().await;
        if snapshot == Snapshot::default() {
            // cleared in the meantime, nothing to write back
            return;
        }

        match self.backend.save(&snapshot).await {
            Ok(()) => info!("Saved data to {}", self.backend.name()),
            Err(e) => error!("Error saving data to {}: {e}", self.backend.name()),
        }
    }
}
