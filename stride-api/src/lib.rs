//! STRIDE API - REST Layer and Postgres Store
//!
//! Exposes the [`stride_engine::LearningEngine`] over HTTP (Axum) and
//! provides [`DbClient`], the PostgreSQL implementation of the engine's
//! storage contract.

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod macros;
pub mod middleware;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::{ApiConfig, StoreMode};
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use extractors::PathId;
pub use middleware::Caller;
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::AppState;
pub use types::*;
