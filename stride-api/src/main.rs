//! STRIDE API Server Entry Point
//!
//! Bootstraps telemetry and configuration, opens the configured store and
//! starts the Axum HTTP server.

use std::sync::Arc;

use axum::Router;
use stride_api::telemetry::{init_tracer, TelemetryConfig};
use stride_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, DbClient, DbConfig, StoreMode,
};
use stride_engine::LearningEngine;
use stride_storage::MemoryStore;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env()?;
    init_tracer(&telemetry_config)?;

    let api_config = ApiConfig::from_env()?;
    if telemetry_config.is_production() && api_config.cors_origins.is_empty() {
        tracing::warn!("STRIDE_CORS_ORIGINS is empty in production; every origin is allowed");
    }

    let (engine, db) = match api_config.store {
        StoreMode::Postgres => {
            let db_config = DbConfig::from_env()?;
            let db = DbClient::from_config(&db_config)?;
            db.migrate().await?;
            tracing::info!(
                host = %db_config.host,
                dbname = %db_config.dbname,
                pool_size = db.pool_size(),
                "Postgres store ready"
            );
            (LearningEngine::new(Arc::new(db.clone())), Some(db))
        }
        StoreMode::Memory => {
            if telemetry_config.is_production() {
                tracing::warn!("STRIDE_STORE=memory in production");
            }
            tracing::warn!("Running on the in-memory store; state is lost on shutdown");
            (LearningEngine::new(Arc::new(MemoryStore::new())), None)
        }
    };

    let addr = api_config.socket_addr()?;
    let state = AppState::new(engine, db, api_config);
    let app: Router = create_api_router(state, telemetry_config.metrics_enabled);

    tracing::info!(
        %addr,
        service = %telemetry_config.service_name,
        environment = %telemetry_config.environment,
        "Starting STRIDE API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
