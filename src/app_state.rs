use std::sync::Arc;

use crate::db::JobRepository;
use crate::services::lifecycle::LifecycleController;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn JobRepository>,
    pub lifecycle: Arc<LifecycleController>,
}

impl AppState {
    pub fn new(repo: Arc<dyn JobRepository>, lifecycle: LifecycleController) -> Self {
        Self {
            repo,
            lifecycle: Arc::new(lifecycle),
        }
    }
}
