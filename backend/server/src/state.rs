use std::sync::Arc;

use super::{
    auth::AuthGateway,
    config::Config,
    persistence::{SnapshotStore, connect},
    store::AssignmentStore,
};

pub struct AppState {
    pub config: Config,
    pub store: Arc<AssignmentStore>,
    pub gateway: AuthGateway,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let backend = connect(&config).await;

        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: Config, backend: Arc<dyn SnapshotStore>) -> Arc<Self> {
        let store = Arc::new(AssignmentStore::new(backend));
        let gateway = AuthGateway::new(store.clone());

        Arc::new(Self {
            config,
            store,
            gateway,
        })
    }

    /// Store after the one-time restore/default draw.
    pub async fn ready(&self) -> &AssignmentStore {
        self.store
            .ensure_initialized(&self.config.participants, self.config.strategy)
            .await;

        &self.store
    }
}
