//! Skill profile and ledger reads

use crate::{EngineResult, LearningEngine};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use stride_core::{
    level_for_points, points_to_next_level, LedgerEntry, SkillDefinition, SkillId, UserId,
};
use tracing::warn;

/// One skill of a learner's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SkillProfileEntry {
    pub skill: SkillDefinition,
    pub total_points: i64,
    pub level: i16,
    /// `None` at the top level
    pub points_to_next_level: Option<i64>,
}

/// A (user, skill) pair whose aggregate disagrees with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LedgerDiscrepancy {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub skill_id: SkillId,
    pub aggregate_total: i64,
    pub ledger_total: i64,
    pub stored_level: i16,
    pub expected_level: i16,
}

impl LearningEngine {
    /// Every defined skill with the learner's total, level and distance to
    /// the next level. Skills never awarded show up at zero.
    pub async fn skill_profile(&self, user_id: UserId) -> EngineResult<Vec<SkillProfileEntry>> {
        let skills = self.store.skill_list().await?;
        let totals: HashMap<SkillId, i64> = self
            .store
            .skill_aggregate_list(user_id)
            .await?
            .into_iter()
            .map(|a| (a.skill_id, a.total_points))
            .collect();

        Ok(skills
            .into_iter()
            .map(|skill| {
                let total_points = totals.get(&skill.skill_id).copied().unwrap_or(0);
                SkillProfileEntry {
                    total_points,
                    level: level_for_points(total_points),
                    points_to_next_level: points_to_next_level(total_points),
                    skill,
                }
            })
            .collect())
    }

    /// Award history, oldest first, optionally for a single skill.
    pub async fn ledger_history(
        &self,
        user_id: UserId,
        skill_id: Option<SkillId>,
    ) -> EngineResult<Vec<LedgerEntry>> {
        let mut entries = self.store.ledger_entries(user_id, skill_id).await?;
        entries.sort_by_key(|e| (e.awarded_at, e.entry_id));
        Ok(entries)
    }

    /// Compare each aggregate with the sum of its ledger entries.
    ///
    /// Returns only the pairs that disagree, so an empty result means the
    /// learner's ledger is consistent.
    pub async fn audit_ledger(&self, user_id: UserId) -> EngineResult<Vec<LedgerDiscrepancy>> {
        let mut ledger_totals: BTreeMap<SkillId, i64> = BTreeMap::new();
        for entry in self.store.ledger_entries(user_id, None).await? {
            *ledger_totals.entry(entry.skill_id).or_default() += i64::from(entry.points);
        }

        let mut aggregates: BTreeMap<SkillId, (i64, i16)> = self
            .store
            .skill_aggregate_list(user_id)
            .await?
            .into_iter()
            .map(|a| (a.skill_id, (a.total_points, a.level)))
            .collect();
        for skill_id in ledger_totals.keys() {
            aggregates.entry(*skill_id).or_insert((0, 0));
        }

        let discrepancies: Vec<_> = aggregates
            .into_iter()
            .filter_map(|(skill_id, (aggregate_total, stored_level))| {
                let ledger_total = ledger_totals.get(&skill_id).copied().unwrap_or(0);
                let expected_level = level_for_points(ledger_total);
                (aggregate_total != ledger_total || stored_level != expected_level).then_some(
                    LedgerDiscrepancy {
                        skill_id,
                        aggregate_total,
                        ledger_total,
                        stored_level,
                        expected_level,
                    },
                )
            })
            .collect();

        if !discrepancies.is_empty() {
            warn!(%user_id, count = discrepancies.len(), "skill ledger out of sync");
        }
        Ok(discrepancies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use stride_core::{EntityIdType, Grant, GrantSource, ModuleId};
    use stride_storage::{LearningStore, MemoryStore};

    fn skill(code: &str) -> SkillDefinition {
        SkillDefinition {
            skill_id: SkillId::now_v7(),
            code: code.to_string(),
            name: format!("Competency {}", code),
            color: "#f59e0b".to_string(),
            description: Some("test skill".to_string()),
        }
    }

    #[tokio::test]
    async fn test_profile_lists_every_skill() {
        let store = Arc::new(MemoryStore::new());
        let c1 = skill("C1");
        let c2 = skill("C2");
        store.insert_skill(c1.clone()).unwrap();
        store.insert_skill(c2.clone()).unwrap();
        let source = GrantSource::Module(ModuleId::now_v7());
        store
            .insert_grant(Grant {
                source,
                skill_id: c2.skill_id,
                points: 12,
            })
            .unwrap();

        let user = UserId::now_v7();
        store.award(user, source, Utc::now()).await.unwrap();

        let engine = LearningEngine::new(store);
        let profile = engine.skill_profile(user).await.unwrap();
        assert_eq!(profile.len(), 2);
        assert_eq!(profile[0].skill.code, "C1");
        assert_eq!(profile[0].total_points, 0);
        assert_eq!(profile[0].level, 0);
        assert_eq!(profile[0].points_to_next_level, Some(1));
        assert_eq!(profile[1].total_points, 12);
        assert_eq!(profile[1].level, 2);
        assert_eq!(profile[1].points_to_next_level, Some(14));
    }

    #[tokio::test]
    async fn test_audit_is_empty_for_consistent_ledger() {
        let store = Arc::new(MemoryStore::new());
        let c1 = skill("C1");
        store.insert_skill(c1.clone()).unwrap();
        let source = GrantSource::Module(ModuleId::now_v7());
        store
            .insert_grant(Grant {
                source,
                skill_id: c1.skill_id,
                points: 30,
            })
            .unwrap();
        let user = UserId::now_v7();
        for _ in 0..4 {
            store.award(user, source, Utc::now()).await.unwrap();
        }

        let engine = LearningEngine::new(store);
        assert!(engine.audit_ledger(user).await.unwrap().is_empty());
        let history = engine.ledger_history(user, Some(c1.skill_id)).await.unwrap();
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn test_audit_reports_aggregate_out_of_step_with_ledger() {
        let store = Arc::new(MemoryStore::new());
        let c1 = skill("C1");
        let c2 = skill("C2");
        store.insert_skill(c1.clone()).unwrap();
        store.insert_skill(c2.clone()).unwrap();
        let source = GrantSource::Module(ModuleId::now_v7());
        for (skill, points) in [(&c1, 30), (&c2, 8)] {
            store
                .insert_grant(Grant {
                    source,
                    skill_id: skill.skill_id,
                    points,
                })
                .unwrap();
        }
        let user = UserId::now_v7();
        store.award(user, source, Utc::now()).await.unwrap();
        store
            .force_aggregate_total(user, c1.skill_id, 55, Utc::now())
            .unwrap();

        let engine = LearningEngine::new(store);
        let report = engine.audit_ledger(user).await.unwrap();
        assert_eq!(
            report,
            vec![LedgerDiscrepancy {
                skill_id: c1.skill_id,
                aggregate_total: 55,
                ledger_total: 30,
                stored_level: 4,
                expected_level: 3,
            }]
        );
        // Other users are unaffected.
        assert!(engine.audit_ledger(UserId::now_v7()).await.unwrap().is_empty());
    }
}
