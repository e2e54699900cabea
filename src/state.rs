use std::sync::Arc;
use std::time::Instant;

use crate::db::DatabaseProxy;
use crate::response::AppError;
use crate::services::Engine;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    db_proxy: Option<Arc<DatabaseProxy>>,
    engine: Option<Arc<Engine>>,
}

impl AppState {
    pub fn new(db_proxy: Option<Arc<DatabaseProxy>>, engine: Option<Arc<Engine>>) -> Self {
        Self {
            started_at: Instant::now(),
            db_proxy,
            engine,
        }
    }

    pub fn db_proxy(&self) -> Option<Arc<DatabaseProxy>> {
        self.db_proxy.clone()
    }

    pub fn engine(&self) -> Option<Arc<Engine>> {
        self.engine.clone()
    }

    /// The engine needs a store; without one every learner operation is unavailable.
    pub fn require_engine(&self) -> Result<Arc<Engine>, AppError> {
        self.engine
            .clone()
            .ok_or_else(|| AppError::service_unavailable("Store is not initialized"))
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
