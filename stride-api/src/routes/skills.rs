//! Skill Profile REST API Routes

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use stride_engine::{LearningEngine, LedgerDiscrepancy, SkillProfileEntry};

use crate::{
    error::{ApiError, ApiResult},
    middleware::Caller,
    state::AppState,
    types::{LedgerEntryResponse, LedgerQuery},
};

/// GET /api/v1/skills/me - Skill profile of the caller
#[cfg_attr(
    feature = "openapi",
    utoipa::path(
        get,
        path = "/api/v1/skills/me",
        tag = "Skills",
        responses(
            (status = 200, description = "Every skill with total, level and distance to the next level", body = Vec<SkillProfileEntry>),
            (status = 401, description = "Missing caller identity", body = ApiError),
        ),
        security(
            ("user_header" = [])
        )
    )
)]
pub async fn skill_profile(
    State(engine): State<LearningEngine>,
    Caller(user_id): Caller,
) -> ApiResult<Json<Vec<SkillProfileEntry>>> {
    let profile = engine.skill_profile(user_id).await?;
    Ok(Json(profile))
}

/// GET /api/v1/skills/me/ledger - Award history of the caller
#[cfg_attr(
    feature = "openapi",
    utoipa::path(
        get,
        path = "/api/v1/skills/me/ledger",
        tag = "Skills",
        params(LedgerQuery),
        responses(
            (status = 200, description = "Ledger entries, oldest first", body = Vec<LedgerEntryResponse>),
            (status = 400, description = "Malformed skill_id", body = ApiError),
            (status = 401, description = "Missing caller identity", body = ApiError),
        ),
        security(
            ("user_header" = [])
        )
    )
)]
pub async fn ledger_history(
    State(engine): State<LearningEngine>,
    Caller(user_id): Caller,
    query: Result<Query<LedgerQuery>, axum::extract::rejection::QueryRejection>,
) -> ApiResult<Json<Vec<LedgerEntryResponse>>> {
    let Query(query) = query.map_err(|e| ApiError::invalid_input(e.body_text()))?;
    let entries = engine.ledger_history(user_id, query.skill_id).await?;
    Ok(Json(entries.into_iter().map(LedgerEntryResponse::from).collect()))
}

/// GET /api/v1/skills/me/audit - Aggregates that disagree with the ledger
#[cfg_attr(
    feature = "openapi",
    utoipa::path(
        get,
        path = "/api/v1/skills/me/audit",
        tag = "Skills",
        responses(
            (status = 200, description = "Discrepancies; empty when consistent", body = Vec<LedgerDiscrepancy>),
            (status = 401, description = "Missing caller identity", body = ApiError),
        ),
        security(
            ("user_header" = [])
        )
    )
)]
pub async fn audit_ledger(
    State(engine): State<LearningEngine>,
    Caller(user_id): Caller,
) -> ApiResult<Json<Vec<LedgerDiscrepancy>>> {
    let discrepancies = engine.audit_ledger(user_id).await?;
    Ok(Json(discrepancies))
}

/// Create the skill profile router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/me", get(skill_profile))
        .route("/me/ledger", get(ledger_history))
        .route("/me/audit", get(audit_ledger))
        .with_state(state)
}
