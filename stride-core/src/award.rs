//! Award receipts

use crate::{SkillAggregate, SkillDefinition, SkillId};
use serde::{Deserialize, Serialize};

/// Effect of one award on one skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SkillAward {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub skill_id: SkillId,
    pub code: String,
    pub name: String,
    pub points_awarded: i32,
    pub new_total_points: i64,
    pub new_level: i16,
}

impl SkillAward {
    pub fn new(skill: &SkillDefinition, points_awarded: i32, aggregate: &SkillAggregate) -> Self {
        Self {
            skill_id: skill.skill_id,
            code: skill.code.clone(),
            name: skill.name.clone(),
            points_awarded,
            new_total_points: aggregate.total_points,
            new_level: aggregate.level,
        }
    }
}

/// Result of applying every grant of a source for one learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AwardReceipt {
    /// False when the source has no grants configured.
    pub awarded: bool,
    pub skills: Vec<SkillAward>,
}

impl AwardReceipt {
    /// Receipt for a source without grants.
    pub fn none() -> Self {
        Self {
            awarded: false,
            skills: Vec::new(),
        }
    }

    /// Build a receipt, ordering skills by code.
    pub fn from_skills(mut skills: Vec<SkillAward>) -> Self {
        if skills.is_empty() {
            return Self::none();
        }
        skills.sort_by(|a, b| a.code.cmp(&b.code));
        Self {
            awarded: true,
            skills,
        }
    }

    pub fn total_points(&self) -> i64 {
        self.skills.iter().map(|s| i64::from(s.points_awarded)).sum()
    }
}

/// Awards produced by committing module progress.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompletionAwards {
    /// Module grants, present when this commit completed the module.
    pub module: Option<AwardReceipt>,
    /// Course grants, present when this commit also completed the course.
    pub course: Option<AwardReceipt>,
}
