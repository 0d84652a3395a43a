//! Activity Check-In REST API Routes
//!
//! Self check-in for the calling learner and the read-only status used to
//! render the check-in button.

use axum::{extract::State, routing::get, Json, Router};
use stride_core::{ActivityId, CheckInStatus, SourceKind};
use stride_engine::{CheckInResult, LearningEngine};

#[cfg(feature = "openapi")]
use crate::error::ApiError;
use crate::{
    error::ApiResult,
    extractors::PathId,
    middleware::Caller,
    routes::record_awards,
    state::AppState,
    telemetry::metrics::metrics,
};

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/v1/activities/{id}/check-in - Check the caller in
#[cfg_attr(
    feature = "openapi",
    utoipa::path(
        post,
        path = "/api/v1/activities/{id}/check-in",
        tag = "Activities",
        params(
            ("id" = Uuid, Path, description = "Activity ID")
        ),
        responses(
            (status = 200, description = "Checked in and skill points awarded", body = CheckInResult),
            (status = 401, description = "Missing caller identity", body = ApiError),
            (status = 403, description = "Caller is not a participant", body = ApiError),
            (status = 404, description = "Activity not found", body = ApiError),
            (status = 409, description = "Already checked in, details carry checked_at", body = ApiError),
            (status = 422, description = "Activity not started or already ended", body = ApiError),
        ),
        security(
            ("user_header" = [])
        )
    )
)]
pub async fn self_check_in(
    State(engine): State<LearningEngine>,
    Caller(user_id): Caller,
    PathId(activity_id): PathId<ActivityId>,
) -> ApiResult<Json<CheckInResult>> {
    let outcome = engine.self_check_in(user_id, activity_id).await;

    if let Some(m) = metrics() {
        match &outcome {
            Ok(result) => {
                m.record_check_in("checked_in");
                record_awards(m, SourceKind::Activity, &result.skills_awarded);
            }
            Err(err) => m.record_check_in(err.kind()),
        }
    }

    Ok(Json(outcome?))
}

/// GET /api/v1/activities/{id}/check-in - Check-in state of the caller
#[cfg_attr(
    feature = "openapi",
    utoipa::path(
        get,
        path = "/api/v1/activities/{id}/check-in",
        tag = "Activities",
        params(
            ("id" = Uuid, Path, description = "Activity ID")
        ),
        responses(
            (status = 200, description = "Current check-in state", body = CheckInStatus),
            (status = 401, description = "Missing caller identity", body = ApiError),
            (status = 404, description = "Activity not found", body = ApiError),
        ),
        security(
            ("user_header" = [])
        )
    )
)]
pub async fn check_in_status(
    State(engine): State<LearningEngine>,
    Caller(user_id): Caller,
    PathId(activity_id): PathId<ActivityId>,
) -> ApiResult<Json<CheckInStatus>> {
    let status = engine.check_in_status(user_id, activity_id).await?;
    Ok(Json(status))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the activity check-in router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/:id/check-in", get(check_in_status).post(self_check_in))
        .with_state(state)
}
