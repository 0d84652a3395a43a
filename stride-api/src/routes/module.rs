//! Module Progression REST API Routes
//!
//! A module is worked through as pre-test, video, test. Every mutating route
//! answers with the resulting progress and any skill points the action
//! awarded, including course grants when the action finished the course.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use stride_core::{ModuleId, ProgressView, QuizAttempt, SourceKind};
use stride_engine::{LearningEngine, QuizSubmission, StageUpdate};

use crate::{
    error::{ApiError, ApiResult},
    extractors::PathId,
    middleware::Caller,
    routes::record_awards,
    state::AppState,
    telemetry::metrics::metrics,
    types::{QuizSubmitRequest, SkipStageRequest},
};

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/v1/modules/{id}/progress - Resumable progress of the caller
#[cfg_attr(
    feature = "openapi",
    utoipa::path(
        get,
        path = "/api/v1/modules/{id}/progress",
        tag = "Modules",
        params(
            ("id" = Uuid, Path, description = "Module ID")
        ),
        responses(
            (status = 200, description = "Current stage and scores", body = ProgressView),
            (status = 401, description = "Missing caller identity", body = ApiError),
            (status = 404, description = "Module not found", body = ApiError),
        ),
        security(
            ("user_header" = [])
        )
    )
)]
pub async fn module_progress(
    State(engine): State<LearningEngine>,
    Caller(user_id): Caller,
    PathId(module_id): PathId<ModuleId>,
) -> ApiResult<Json<ProgressView>> {
    let progress = engine.module_progress(user_id, module_id).await?;
    Ok(Json(progress))
}

/// POST /api/v1/modules/{id}/quiz - Submit the pre-test or the test
#[cfg_attr(
    feature = "openapi",
    utoipa::path(
        post,
        path = "/api/v1/modules/{id}/quiz",
        tag = "Modules",
        params(
            ("id" = Uuid, Path, description = "Module ID")
        ),
        request_body = QuizSubmitRequest,
        responses(
            (status = 200, description = "Submission scored and recorded", body = QuizSubmission),
            (status = 400, description = "Answers do not fit the quiz", body = ApiError),
            (status = 401, description = "Missing caller identity", body = ApiError),
            (status = 404, description = "Module not found", body = ApiError),
            (status = 409, description = "Module already completed", body = ApiError),
            (status = 422, description = "Quiz not available at the current stage", body = ApiError),
        ),
        security(
            ("user_header" = [])
        )
    )
)]
pub async fn submit_quiz(
    State(engine): State<LearningEngine>,
    Caller(user_id): Caller,
    PathId(module_id): PathId<ModuleId>,
    Json(req): Json<QuizSubmitRequest>,
) -> ApiResult<Json<QuizSubmission>> {
    req.validate()
        .map_err(|e| ApiError::validation_failed(e.to_string()))?;

    let submission = engine
        .submit_module_quiz(user_id, module_id, req.quiz_type, req.answers)
        .await?;

    if let Some(m) = metrics() {
        m.record_quiz_submission(req.quiz_type, submission.passed);
        record_stage_awards(m, &submission.update);
    }

    Ok(Json(submission))
}

/// POST /api/v1/modules/{id}/video/complete - Mark the video as watched
#[cfg_attr(
    feature = "openapi",
    utoipa::path(
        post,
        path = "/api/v1/modules/{id}/video/complete",
        tag = "Modules",
        params(
            ("id" = Uuid, Path, description = "Module ID")
        ),
        responses(
            (status = 200, description = "Video recorded", body = StageUpdate),
            (status = 401, description = "Missing caller identity", body = ApiError),
            (status = 404, description = "Module not found", body = ApiError),
            (status = 409, description = "Module already completed", body = ApiError),
            (status = 422, description = "Video not available at the current stage", body = ApiError),
        ),
        security(
            ("user_header" = [])
        )
    )
)]
pub async fn complete_video(
    State(engine): State<LearningEngine>,
    Caller(user_id): Caller,
    PathId(module_id): PathId<ModuleId>,
) -> ApiResult<Json<StageUpdate>> {
    let update = engine.complete_video(user_id, module_id).await?;
    if let Some(m) = metrics() {
        record_stage_awards(m, &update);
    }
    Ok(Json(update))
}

/// POST /api/v1/modules/{id}/skip - Skip a stage that has no content
#[cfg_attr(
    feature = "openapi",
    utoipa::path(
        post,
        path = "/api/v1/modules/{id}/skip",
        tag = "Modules",
        params(
            ("id" = Uuid, Path, description = "Module ID")
        ),
        request_body = SkipStageRequest,
        responses(
            (status = 200, description = "Stage skipped", body = StageUpdate),
            (status = 401, description = "Missing caller identity", body = ApiError),
            (status = 404, description = "Module not found", body = ApiError),
            (status = 409, description = "Module already completed", body = ApiError),
            (status = 422, description = "Stage has content or is not current", body = ApiError),
        ),
        security(
            ("user_header" = [])
        )
    )
)]
pub async fn skip_stage(
    State(engine): State<LearningEngine>,
    Caller(user_id): Caller,
    PathId(module_id): PathId<ModuleId>,
    Json(req): Json<SkipStageRequest>,
) -> ApiResult<Json<StageUpdate>> {
    let update = engine.skip_stage(user_id, module_id, req.stage).await?;
    if let Some(m) = metrics() {
        record_stage_awards(m, &update);
    }
    Ok(Json(update))
}

/// GET /api/v1/modules/{id}/attempts - Quiz attempts of the caller
#[cfg_attr(
    feature = "openapi",
    utoipa::path(
        get,
        path = "/api/v1/modules/{id}/attempts",
        tag = "Modules",
        params(
            ("id" = Uuid, Path, description = "Module ID")
        ),
        responses(
            (status = 200, description = "Attempts, oldest first", body = Vec<QuizAttempt>),
            (status = 401, description = "Missing caller identity", body = ApiError),
            (status = 404, description = "Module not found", body = ApiError),
        ),
        security(
            ("user_header" = [])
        )
    )
)]
pub async fn list_attempts(
    State(engine): State<LearningEngine>,
    Caller(user_id): Caller,
    PathId(module_id): PathId<ModuleId>,
) -> ApiResult<Json<Vec<QuizAttempt>>> {
    let attempts = engine.quiz_attempts(user_id, module_id).await?;
    Ok(Json(attempts))
}

fn record_stage_awards(m: &crate::telemetry::StrideMetrics, update: &StageUpdate) {
    record_awards(m, SourceKind::Module, &update.skills_awarded);
    record_awards(m, SourceKind::Course, &update.course_skills_awarded);
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the module progression router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/:id/progress", get(module_progress))
        .route("/:id/quiz", post(submit_quiz))
        .route("/:id/video/complete", post(complete_video))
        .route("/:id/skip", post(skip_stage))
        .route("/:id/attempts", get(list_attempts))
        .with_state(state)
}
