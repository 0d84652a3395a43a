//! OpenAPI Specification for STRIDE API
//!
//! The document is generated by utoipa from the route annotations and the
//! schema derives on the request and response types.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::config::DEFAULT_USER_HEADER;
use crate::error::{ApiError, ErrorCode};
use crate::routes::health::{ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::routes::{checkin, health, module, skills};
use crate::types::{LedgerEntryResponse, QuizSubmitRequest, SkipStageRequest};

use stride_core::{
    ActivityStatus, CheckInStatus, ModuleStage, ProgressView, QuizAttempt, QuizType,
    SkillAward, SkillDefinition, SourceKind,
};
use stride_engine::{
    CheckInResult, LedgerDiscrepancy, QuizSubmission, SkillProfileEntry, StageUpdate,
};

/// OpenAPI document for STRIDE API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "STRIDE API",
        description = "Skill progression and learning-state engine: activity check-in, module progression and the skill ledger",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Activities", description = "Self check-in to attended activities"),
        (name = "Modules", description = "Pre-test, video and test progression through course modules"),
        (name = "Skills", description = "Skill profile, award history and ledger audit"),
        (name = "Health", description = "Liveness and readiness checks"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        checkin::self_check_in,
        checkin::check_in_status,
        module::module_progress,
        module::submit_quiz,
        module::complete_video,
        module::skip_stage,
        module::list_attempts,
        skills::skill_profile,
        skills::ledger_history,
        skills::audit_ledger,
        health::ping,
        health::liveness,
        health::readiness,
        crate::telemetry::metrics::metrics_handler,
    ),
    components(schemas(
        ApiError,
        ErrorCode,
        CheckInResult,
        CheckInStatus,
        ActivityStatus,
        SkillAward,
        SkillDefinition,
        SourceKind,
        ProgressView,
        ModuleStage,
        QuizType,
        QuizAttempt,
        QuizSubmitRequest,
        QuizSubmission,
        SkipStageRequest,
        StageUpdate,
        SkillProfileEntry,
        LedgerEntryResponse,
        LedgerDiscrepancy,
        HealthResponse,
        HealthStatus,
        HealthDetails,
        ComponentHealth,
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the caller identity header as a security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "user_header",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    DEFAULT_USER_HEADER,
                    "Learner UUID forwarded by the authenticating gateway",
                ))),
            );
        }
    }
}

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
