//! REST API Routes Module
//!
//! Route handlers grouped by resource:
//! - Activity check-in under /api/v1/activities
//! - Module progression under /api/v1/modules
//! - Skill profile and ledger under /api/v1/skills
//! - Health checks (Kubernetes-compatible)
//! - CORS support for browser-based clients

pub mod checkin;
pub mod health;
pub mod module;
pub mod skills;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, request::Parts, HeaderValue, Method},
    middleware::from_fn,
    routing::get,
    Router,
};
use stride_core::{SkillAward, SourceKind};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::ApiConfig;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware, StrideMetrics};

pub use checkin::create_router as checkin_router;
pub use health::create_router as health_router;
pub use module::create_router as module_router;
pub use skills::create_router as skills_router;

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

/// Handler for /openapi.json endpoint.
#[cfg(feature = "openapi")]
async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let user_header = HeaderName::from_bytes(config.user_header.as_bytes())
        .unwrap_or_else(|_| HeaderName::from_static(crate::config::DEFAULT_USER_HEADER));
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, user_header])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        return cors.allow_origin(Any).allow_headers(Any);
    }

    tracing::info!(
        "CORS: Production mode - allowing origins: {:?}",
        config.cors_origins
    );
    let allowed = Arc::new(config.clone());
    let cors = cors.allow_origin(AllowOrigin::predicate(
        move |origin: &HeaderValue, _: &Parts| {
            origin
                .to_str()
                .is_ok_and(|origin| allowed.is_origin_allowed(origin))
        },
    ));
    if config.cors_allow_credentials {
        cors.allow_credentials(true)
    } else {
        cors
    }
}

// ============================================================================
// METRICS HELPERS
// ============================================================================

/// Count the points of one award receipt under its source kind.
pub(crate) fn record_awards(metrics: &StrideMetrics, kind: SourceKind, awards: &[SkillAward]) {
    let points: i64 = awards.iter().map(|a| i64::from(a.points_awarded)).sum();
    metrics.record_points_awarded(kind, points);
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete API router.
///
/// - Learner routes under /api/v1/* (caller identity required per handler)
/// - Health checks at /health/*
/// - Metrics at /metrics when `metrics_enabled`
/// - OpenAPI spec at /openapi.json with the `openapi` feature
///
/// # Middleware Order (outer to inner)
/// 1. CORS (outermost) - handles preflight requests
/// 2. Observability - tracing and metrics
pub fn create_api_router(state: AppState, metrics_enabled: bool) -> Router {
    let api_routes = Router::new()
        .nest("/activities", checkin::create_router(state.clone()))
        .nest("/modules", module::create_router(state.clone()))
        .nest("/skills", skills::create_router(state.clone()));

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health::create_router(state.clone()));

    #[cfg(feature = "openapi")]
    {
        router = router.route("/openapi.json", get(openapi_json));
    }

    if metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    let cors = build_cors_layer(&state.config);

    router
        .layer(from_fn(observability_middleware))
        .layer(cors)
}
