//! Application state shared across handlers.

use stitch_coordinator::Coordinator;
use stitch_core::config::AppConfig;
use stitch_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Upload coordinator over `storage`.
    pub coordinator: Coordinator,
}

impl AppState {
    pub fn new(config: AppConfig, storage: Arc<dyn ObjectStore>) -> Self {
        let coordinator = Coordinator::new(storage.clone(), &config.upload);
        Self {
            config: Arc::new(config),
            storage,
            coordinator,
        }
    }
}
