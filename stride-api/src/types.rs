//! Request and Response Types for the REST API
//!
//! Engine results already serialize in their wire shape and are returned
//! directly. This module holds request bodies, query strings and the views
//! that flatten domain types for JSON.

use serde::{Deserialize, Serialize};
use stride_core::{
    LedgerEntry, ModuleStage, QuizType, SkillId, SourceKind, Timestamp, ValidationError,
};
use uuid::Uuid;

// ============================================================================
// MODULE PROGRESSION
// ============================================================================

/// Body of `POST /api/v1/modules/:id/quiz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QuizSubmitRequest {
    pub quiz_type: QuizType,
    /// Selected option index per question, in question order
    pub answers: Vec<i32>,
}

impl QuizSubmitRequest {
    /// Shape checks that do not need the module.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some((index, &selected)) = self.answers.iter().enumerate().find(|(_, a)| **a < 0) {
            return Err(ValidationError::InvalidValue {
                field: format!("answers[{}]", index),
                reason: format!("{} is not an option index", selected),
            });
        }
        Ok(())
    }
}

/// Body of `POST /api/v1/modules/:id/skip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SkipStageRequest {
    pub stage: ModuleStage,
}

// ============================================================================
// SKILL LEDGER
// ============================================================================

/// Query string of `GET /api/v1/skills/me/ledger`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct LedgerQuery {
    /// Restrict the history to one skill
    #[cfg_attr(feature = "openapi", param(value_type = Option<Uuid>))]
    pub skill_id: Option<SkillId>,
}

/// One ledger entry as exposed over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LedgerEntryResponse {
    pub entry_id: Uuid,
    pub skill_id: Uuid,
    pub source_kind: SourceKind,
    /// Id of the activity, module or course that earned the points
    pub source_id: Uuid,
    pub points: i32,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub awarded_at: Timestamp,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            entry_id: entry.entry_id.into(),
            skill_id: entry.skill_id.into(),
            source_kind: entry.source.kind(),
            source_id: entry.source.source_uuid(),
            points: entry.points,
            awarded_at: entry.awarded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stride_core::{ActivityId, EntityIdType, GrantSource, LedgerEntryId, UserId};

    #[test]
    fn test_quiz_request_rejects_negative_answers() {
        let request = QuizSubmitRequest {
            quiz_type: QuizType::Test,
            answers: vec![0, 2, -1],
        };
        let err = request.validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "answers[2]"));
    }

    #[test]
    fn test_quiz_request_wire_format() {
        let request: QuizSubmitRequest =
            serde_json::from_str(r#"{"quiz_type":"pre_test","answers":[0,1,2,3,0]}"#).unwrap();
        assert_eq!(request.quiz_type, QuizType::PreTest);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_skip_request_wire_format() {
        let request: SkipStageRequest = serde_json::from_str(r#"{"stage":"video"}"#).unwrap();
        assert_eq!(request.stage, ModuleStage::Video);
    }

    #[test]
    fn test_ledger_entry_response_flattens_source() {
        let activity = ActivityId::now_v7();
        let entry = LedgerEntry {
            entry_id: LedgerEntryId::now_v7(),
            user_id: UserId::now_v7(),
            skill_id: SkillId::now_v7(),
            source: GrantSource::Activity(activity),
            points: 5,
            awarded_at: Utc::now(),
        };
        let response = LedgerEntryResponse::from(entry);
        assert_eq!(response.source_kind, SourceKind::Activity);
        assert_eq!(response.source_id, activity.as_uuid());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["source_kind"], "activity");
        assert_eq!(json["points"], 5);
    }
}
