//! Core entity structures

use crate::{
    // ID types
    ActivityId, CourseId, LedgerEntryId, ModuleId, QuizAttemptId, SkillId, UserId,
    // Other types
    GrantSource, QuizType, Timestamp,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// REFERENCE DATA (owned by the authoring subsystems)
// ============================================================================

/// A tracked competency dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SkillDefinition {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub skill_id: SkillId,
    /// Short stable code, e.g. "C1"
    pub code: String,
    pub name: String,
    /// Display colour, e.g. "#4f46e5"
    pub color: String,
    pub description: Option<String>,
}

/// Configured point value a source awards for one skill.
///
/// `points` is copied into every ledger entry at award time; editing a grant
/// later never changes past awards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub source: GrantSource,
    pub skill_id: SkillId,
    pub points: i32,
}

/// Activity record with its check-in window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Activity {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub activity_id: ActivityId,
    pub title: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub start_date: Timestamp,
    /// Open-ended when absent
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub end_date: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Course {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub course_id: CourseId,
    pub title: String,
}

/// Multiple-choice question of a module quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QuizQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    /// Index into `options` of the correct answer
    pub correct_index: i32,
}

/// Learning unit with up to three content stages.
///
/// An empty question list or a missing video URL means the stage has no
/// content and must be skipped explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Module {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub module_id: ModuleId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub course_id: CourseId,
    pub title: String,
    /// Ordering inside the course
    pub position: i32,
    pub pre_test: Vec<QuizQuestion>,
    pub video_url: Option<String>,
    pub test: Vec<QuizQuestion>,
}

impl Module {
    /// Questions configured for the given quiz.
    pub fn questions(&self, quiz_type: QuizType) -> &[QuizQuestion] {
        match quiz_type {
            QuizType::PreTest => &self.pre_test,
            QuizType::Test => &self.test,
        }
    }

    pub fn has_video(&self) -> bool {
        self.video_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }
}

// ============================================================================
// SKILL LEDGER
// ============================================================================

/// One immutable award of points. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: LedgerEntryId,
    pub user_id: UserId,
    pub skill_id: SkillId,
    pub source: GrantSource,
    pub points: i32,
    pub awarded_at: Timestamp,
}

/// Denormalized running total for one (user, skill).
///
/// `total_points` always equals the sum of the matching ledger entries and
/// `level` always equals `level_for_points(total_points)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SkillAggregate {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: UserId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub skill_id: SkillId,
    pub total_points: i64,
    pub level: i16,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub last_updated: Timestamp,
}

// ============================================================================
// LEARNER STATE
// ============================================================================

/// A learner's membership in an activity.
///
/// `checked_at` is set exactly when `checked_in` is true, and `checked_in`
/// flips false -> true at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Participation {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: UserId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub activity_id: ActivityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub joined_at: Timestamp,
    pub checked_in: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub checked_at: Option<Timestamp>,
}

impl Participation {
    /// A freshly joined, not yet checked-in participation.
    pub fn joined(user_id: UserId, activity_id: ActivityId, joined_at: Timestamp) -> Self {
        Self {
            user_id,
            activity_id,
            joined_at,
            checked_in: false,
            checked_at: None,
        }
    }
}

/// Persisted checkpoint of a learner inside one module.
///
/// There is deliberately no stage field: the stage is derived from these
/// fields by [`resume_stage`](crate::resume_stage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ModuleProgress {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: UserId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub module_id: ModuleId,
    pub pre_test_score: Option<i32>,
    pub pre_test_total: Option<i32>,
    pub video_completed: bool,
    pub test_score: Option<i32>,
    pub test_total: Option<i32>,
    pub completed: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl ModuleProgress {
    /// Progress of a learner who has not interacted with the module yet.
    pub fn fresh(user_id: UserId, module_id: ModuleId, now: Timestamp) -> Self {
        Self {
            user_id,
            module_id,
            pre_test_score: None,
            pre_test_total: None,
            video_completed: false,
            test_score: None,
            test_total: None,
            completed: false,
            updated_at: now,
        }
    }
}

/// Audit record of one quiz submission. Kept even when superseded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QuizAttempt {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub attempt_id: QuizAttemptId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: UserId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub module_id: ModuleId,
    pub quiz_type: QuizType,
    pub answers: Vec<i32>,
    pub score: i32,
    pub total: i32,
    pub passed: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub submitted_at: Timestamp,
}

/// Marker that a learner finished every module of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CourseCompletion {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: UserId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub course_id: CourseId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub completed_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityIdType;
    use chrono::Utc;

    fn question(correct_index: i32) -> QuizQuestion {
        QuizQuestion {
            prompt: "Pick one".to_string(),
            options: vec!["a".into(), "b".into(), "c".into()],
            correct_index,
        }
    }

    fn module(video_url: Option<&str>) -> Module {
        Module {
            module_id: ModuleId::now_v7(),
            course_id: CourseId::now_v7(),
            title: "Intro".to_string(),
            position: 1,
            pre_test: vec![question(0)],
            video_url: video_url.map(str::to_string),
            test: vec![question(1), question(2)],
        }
    }

    #[test]
    fn test_module_questions_by_quiz_type() {
        let m = module(None);
        assert_eq!(m.questions(QuizType::PreTest).len(), 1);
        assert_eq!(m.questions(QuizType::Test).len(), 2);
    }

    #[test]
    fn test_module_blank_video_url_counts_as_absent() {
        assert!(!module(None).has_video());
        assert!(!module(Some("   ")).has_video());
        assert!(module(Some("https://videos.example/intro.mp4")).has_video());
    }

    #[test]
    fn test_fresh_progress_has_nothing_set() {
        let p = ModuleProgress::fresh(UserId::now_v7(), ModuleId::now_v7(), Utc::now());
        assert!(p.pre_test_score.is_none());
        assert!(!p.video_completed);
        assert!(p.test_score.is_none());
        assert!(!p.completed);
    }

    #[test]
    fn test_joined_participation_is_not_checked_in() {
        let p = Participation::joined(UserId::now_v7(), ActivityId::now_v7(), Utc::now());
        assert!(!p.checked_in);
        assert!(p.checked_at.is_none());
    }
}
