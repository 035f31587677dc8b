/// Shared application state
use mobility_core::JobRepository;
use mobility_sync::SyncManager;
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SyncManager>,
    pub jobs: Arc<dyn JobRepository>,
}

impl AppState {
    pub fn new(manager: Arc<SyncManager>, jobs: Arc<dyn JobRepository>) -> Self {
        Self { manager, jobs }
    }
}
