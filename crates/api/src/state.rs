use std::sync::{Mutex, MutexGuard};

use pipeline::{build_orchestrator, AppConfig, BatchState, LoadedSource, ProviderOrchestrator};
use tokio::sync::RwLock;

/// Single-session server state.
///
/// The table sits behind an async lock because a batch holds it for the
/// whole run. Batch state uses a plain mutex: it is only touched for short
/// updates, including from the per-row progress callback.
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: ProviderOrchestrator,
    pub source: RwLock<Option<LoadedSource>>,
    batch: Mutex<BatchState>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let orchestrator = build_orchestrator(&config);
        Self {
            config,
            orchestrator,
            source: RwLock::new(None),
            batch: Mutex::new(BatchState::Idle),
        }
    }

    pub fn batch(&self) -> MutexGuard<'_, BatchState> {
        self.batch.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
