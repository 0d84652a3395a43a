//! Enum types for STRIDE entities

use crate::{ActivityId, CourseId, ModuleId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// CORE ENUMS
// ============================================================================

/// Entity type discriminator used by storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum EntityType {
    User,
    Activity,
    Course,
    Module,
    Skill,
    Grant,
    Participation,
    LedgerEntry,
    SkillAggregate,
    ModuleProgress,
    QuizAttempt,
    CourseCompletion,
}

/// Which quiz of a module a submission belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
    PreTest,
    Test,
}

impl QuizType {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            QuizType::PreTest => "pre_test",
            QuizType::Test => "test",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, QuizTypeParseError> {
        match s.to_lowercase().as_str() {
            "pre_test" | "pretest" => Ok(QuizType::PreTest),
            "test" => Ok(QuizType::Test),
            _ => Err(QuizTypeParseError(s.to_string())),
        }
    }

    /// The progression stage this quiz is taken in.
    pub fn stage(&self) -> ModuleStage {
        match self {
            QuizType::PreTest => ModuleStage::PreTest,
            QuizType::Test => ModuleStage::Test,
        }
    }
}

impl fmt::Display for QuizType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for QuizType {
    type Err = QuizTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid quiz type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizTypeParseError(pub String);

impl fmt::Display for QuizTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid quiz type: {}", self.0)
    }
}

impl std::error::Error for QuizTypeParseError {}

/// Stage of the module learning sequence.
///
/// Never stored: always derived from the fields of
/// [`ModuleProgress`](crate::ModuleProgress).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ModuleStage {
    PreTest,
    Video,
    Test,
    Complete,
}

impl ModuleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStage::PreTest => "pre_test",
            ModuleStage::Video => "video",
            ModuleStage::Test => "test",
            ModuleStage::Complete => "complete",
        }
    }
}

impl fmt::Display for ModuleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where an activity stands relative to its time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    /// `now` is before the start date
    Upcoming,
    /// Inside the window, check-in is possible
    Ongoing,
    /// `now` is after the end date
    Ended,
}

/// Kind of completable unit a grant is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Activity,
    Module,
    Course,
}

impl SourceKind {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            SourceKind::Activity => "activity",
            SourceKind::Module => "module",
            SourceKind::Course => "course",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, SourceKindParseError> {
        match s.to_lowercase().as_str() {
            "activity" => Ok(SourceKind::Activity),
            "module" => Ok(SourceKind::Module),
            "course" => Ok(SourceKind::Course),
            _ => Err(SourceKindParseError(s.to_string())),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for SourceKind {
    type Err = SourceKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid source kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKindParseError(pub String);

impl fmt::Display for SourceKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid grant source kind: {}", self.0)
    }
}

impl std::error::Error for SourceKindParseError {}

/// The completable unit that earns skill points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum GrantSource {
    Activity(ActivityId),
    Module(ModuleId),
    Course(CourseId),
}

impl GrantSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            GrantSource::Activity(_) => SourceKind::Activity,
            GrantSource::Module(_) => SourceKind::Module,
            GrantSource::Course(_) => SourceKind::Course,
        }
    }

    /// The raw id of the referenced unit.
    pub fn source_uuid(&self) -> Uuid {
        match self {
            GrantSource::Activity(id) => (*id).into(),
            GrantSource::Module(id) => (*id).into(),
            GrantSource::Course(id) => (*id).into(),
        }
    }

    /// Rebuild a source from its stored (kind, id) pair.
    pub fn from_parts(kind: SourceKind, id: Uuid) -> Self {
        match kind {
            SourceKind::Activity => GrantSource::Activity(id.into()),
            SourceKind::Module => GrantSource::Module(id.into()),
            SourceKind::Course => GrantSource::Course(id.into()),
        }
    }
}

impl fmt::Display for GrantSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.source_uuid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityIdType;

    #[test]
    fn test_quiz_type_db_roundtrip() {
        for quiz_type in [QuizType::PreTest, QuizType::Test] {
            assert_eq!(QuizType::from_db_str(quiz_type.as_db_str()), Ok(quiz_type));
        }
        assert!(QuizType::from_db_str("final_exam").is_err());
    }

    #[test]
    fn test_quiz_type_serde_uses_snake_case() {
        let json = serde_json::to_string(&QuizType::PreTest).unwrap();
        assert_eq!(json, "\"pre_test\"");
    }

    #[test]
    fn test_module_stage_ordering_follows_sequence() {
        assert!(ModuleStage::PreTest < ModuleStage::Video);
        assert!(ModuleStage::Video < ModuleStage::Test);
        assert!(ModuleStage::Test < ModuleStage::Complete);
    }

    #[test]
    fn test_grant_source_parts_roundtrip() {
        let source = GrantSource::Module(ModuleId::now_v7());
        let rebuilt = GrantSource::from_parts(source.kind(), source.source_uuid());
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn test_grant_source_serializes_tagged() {
        let id = ActivityId::now_v7();
        let json = serde_json::to_value(GrantSource::Activity(id)).unwrap();
        assert_eq!(json["kind"], "activity");
        assert_eq!(json["id"], id.to_string());
    }
}
