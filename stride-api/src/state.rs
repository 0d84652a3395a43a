//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use stride_engine::LearningEngine;

use crate::config::ApiConfig;
use crate::db::DbClient;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub engine: LearningEngine,
    /// Present when the engine runs on Postgres; readiness pings it.
    pub db: Option<DbClient>,
    pub config: Arc<ApiConfig>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(engine: LearningEngine, db: Option<DbClient>, config: ApiConfig) -> Self {
        Self {
            engine,
            db,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(LearningEngine, engine);
crate::impl_from_ref!(Option<DbClient>, db);
crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(Instant, start_time);
