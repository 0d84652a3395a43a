//! In-memory learning store
//!
//! All state sits behind one lock. A command reads the live state under the
//! write guard and stages its writes per key; the staged writes are applied
//! only when the command finishes, which gives serializable, all-or-nothing
//! commands without a database.

use crate::{CheckInCommit, LearningStore, ProgressCommit, ProgressCommitOutcome};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use stride_core::{
    level_for_points, Activity, ActivityId, AwardReceipt, CompletionAwards, Course,
    CourseCompletion, CourseId, EntityIdType, EntityType, Grant, GrantSource, LedgerEntry,
    LedgerEntryId, Module, ModuleId, ModuleProgress, Participation, QuizAttempt, SkillAggregate,
    SkillAward, SkillDefinition, SkillId, StorageError, StrideError, StrideResult, Timestamp,
    UserId,
};

#[derive(Debug, Default)]
struct State {
    skills: BTreeMap<SkillId, SkillDefinition>,
    activities: HashMap<ActivityId, Activity>,
    courses: HashMap<CourseId, Course>,
    modules: HashMap<ModuleId, Module>,
    grants: Vec<Grant>,
    participations: HashMap<(UserId, ActivityId), Participation>,
    ledger: Vec<LedgerEntry>,
    aggregates: HashMap<(UserId, SkillId), SkillAggregate>,
    progress: HashMap<(UserId, ModuleId), ModuleProgress>,
    attempts: Vec<QuizAttempt>,
    completions: HashMap<(UserId, CourseId), CourseCompletion>,
}

/// Rows written by one command, keyed like the live state.
#[derive(Debug, Default)]
struct Changes {
    participations: HashMap<(UserId, ActivityId), Participation>,
    ledger: Vec<LedgerEntry>,
    aggregates: HashMap<(UserId, SkillId), SkillAggregate>,
    progress: HashMap<(UserId, ModuleId), ModuleProgress>,
    attempts: Vec<QuizAttempt>,
    completions: HashMap<(UserId, CourseId), CourseCompletion>,
}

impl Changes {
    fn apply(self, state: &mut State) {
        state.participations.extend(self.participations);
        state.ledger.extend(self.ledger);
        state.aggregates.extend(self.aggregates);
        state.progress.extend(self.progress);
        state.attempts.extend(self.attempts);
        state.completions.extend(self.completions);
    }
}

/// Live state plus the writes staged so far. Reads see staged rows first.
struct Tx<'a> {
    live: &'a State,
    staged: Changes,
}

impl Tx<'_> {
    fn aggregate(&self, key: (UserId, SkillId)) -> Option<SkillAggregate> {
        self.staged
            .aggregates
            .get(&key)
            .or_else(|| self.live.aggregates.get(&key))
            .cloned()
    }

    fn progress(&self, key: (UserId, ModuleId)) -> Option<&ModuleProgress> {
        self.staged
            .progress
            .get(&key)
            .or_else(|| self.live.progress.get(&key))
    }

    fn completion_exists(&self, key: (UserId, CourseId)) -> bool {
        self.staged.completions.contains_key(&key) || self.live.completions.contains_key(&key)
    }
}

/// In-memory [`LearningStore`] for tests and the `memory` store mode.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StrideResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StrideError::Storage(StorageError::LockPoisoned))
    }

    fn write(&self) -> StrideResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StrideError::Storage(StorageError::LockPoisoned))
    }

    /// Run `command` under the write guard and apply its staged rows on
    /// success. On error the live state is untouched.
    fn transact<T>(
        &self,
        command: impl FnOnce(&mut Tx<'_>) -> StrideResult<T>,
    ) -> StrideResult<T> {
        let mut live = self.write()?;
        let mut tx = Tx {
            live: &live,
            staged: Changes::default(),
        };
        let value = command(&mut tx)?;
        let staged = tx.staged;
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StorageError::TransactionFailed {
                reason: "injected commit failure".to_string(),
            }
            .into());
        }
        staged.apply(&mut live);
        Ok(value)
    }

    /// Make the next atomic command fail after all its writes are staged.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Overwrite an aggregate total without touching the ledger, leaving the
    /// two out of step. Used to exercise ledger audits.
    pub fn force_aggregate_total(
        &self,
        user_id: UserId,
        skill_id: SkillId,
        total_points: i64,
        now: Timestamp,
    ) -> StrideResult<()> {
        let mut state = self.write()?;
        let aggregate = state
            .aggregates
            .entry((user_id, skill_id))
            .or_insert_with(|| SkillAggregate {
                user_id,
                skill_id,
                total_points: 0,
                level: 0,
                last_updated: now,
            });
        aggregate.total_points = total_points;
        aggregate.level = level_for_points(total_points);
        aggregate.last_updated = now;
        Ok(())
    }

    // === Seeding (authoring is owned by other subsystems) ===

    pub fn insert_skill(&self, skill: SkillDefinition) -> StrideResult<()> {
        let mut state = self.write()?;
        if state.skills.values().any(|s| s.code == skill.code) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Skill,
                reason: format!("duplicate skill code {}", skill.code),
            }
            .into());
        }
        state.skills.insert(skill.skill_id, skill);
        Ok(())
    }

    pub fn insert_activity(&self, activity: Activity) -> StrideResult<()> {
        let mut state = self.write()?;
        state.activities.insert(activity.activity_id, activity);
        Ok(())
    }

    pub fn insert_course(&self, course: Course) -> StrideResult<()> {
        let mut state = self.write()?;
        state.courses.insert(course.course_id, course);
        Ok(())
    }

    pub fn insert_module(&self, module: Module) -> StrideResult<()> {
        let mut state = self.write()?;
        if !state.courses.contains_key(&module.course_id) {
            return Err(StorageError::NotFound {
                entity_type: EntityType::Course,
                id: module.course_id.as_uuid(),
            }
            .into());
        }
        state.modules.insert(module.module_id, module);
        Ok(())
    }

    /// Add or replace the grant of a source for one skill.
    pub fn insert_grant(&self, grant: Grant) -> StrideResult<()> {
        let mut state = self.write()?;
        if !state.skills.contains_key(&grant.skill_id) {
            return Err(StorageError::NotFound {
                entity_type: EntityType::Skill,
                id: grant.skill_id.as_uuid(),
            }
            .into());
        }
        if grant.points < 0 {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Grant,
                reason: "points must not be negative".to_string(),
            }
            .into());
        }
        state
            .grants
            .retain(|g| !(g.source == grant.source && g.skill_id == grant.skill_id));
        state.grants.push(grant);
        Ok(())
    }

    /// Record that a learner joined an activity. Joining twice is a no-op.
    pub fn join_activity(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
        joined_at: Timestamp,
    ) -> StrideResult<()> {
        let mut state = self.write()?;
        if !state.activities.contains_key(&activity_id) {
            return Err(StorageError::NotFound {
                entity_type: EntityType::Activity,
                id: activity_id.as_uuid(),
            }
            .into());
        }
        state
            .participations
            .entry((user_id, activity_id))
            .or_insert_with(|| Participation::joined(user_id, activity_id, joined_at));
        Ok(())
    }

    /// Number of ledger entries across all users.
    pub fn ledger_len(&self) -> StrideResult<usize> {
        Ok(self.read()?.ledger.len())
    }
}

/// Stage ledger entries and aggregate bumps for every grant of `source`.
fn apply_award(
    tx: &mut Tx<'_>,
    user_id: UserId,
    source: GrantSource,
    now: Timestamp,
) -> StrideResult<AwardReceipt> {
    let live = tx.live;
    let mut skills = Vec::new();
    for grant in live.grants.iter().filter(|g| g.source == source) {
        let skill = live.skills.get(&grant.skill_id).ok_or(StorageError::NotFound {
            entity_type: EntityType::Skill,
            id: grant.skill_id.as_uuid(),
        })?;

        tx.staged.ledger.push(LedgerEntry {
            entry_id: LedgerEntryId::now_v7(),
            user_id,
            skill_id: grant.skill_id,
            source,
            points: grant.points,
            awarded_at: now,
        });

        let key = (user_id, grant.skill_id);
        let mut aggregate = tx.aggregate(key).unwrap_or(SkillAggregate {
            user_id,
            skill_id: grant.skill_id,
            total_points: 0,
            level: 0,
            last_updated: now,
        });
        aggregate.total_points += i64::from(grant.points);
        aggregate.level = level_for_points(aggregate.total_points);
        aggregate.last_updated = now;

        skills.push(SkillAward::new(skill, grant.points, &aggregate));
        tx.staged.aggregates.insert(key, aggregate);
    }

    Ok(AwardReceipt::from_skills(skills))
}

fn course_finished(tx: &Tx<'_>, user_id: UserId, course_id: CourseId) -> bool {
    let mut modules = tx
        .live
        .modules
        .values()
        .filter(|m| m.course_id == course_id)
        .peekable();
    if modules.peek().is_none() {
        return false;
    }
    modules.all(|m| tx.progress((user_id, m.module_id)).is_some_and(|p| p.completed))
}

#[async_trait]
impl LearningStore for MemoryStore {
    async fn activity_get(&self, id: ActivityId) -> StrideResult<Option<Activity>> {
        Ok(self.read()?.activities.get(&id).cloned())
    }

    async fn module_get(&self, id: ModuleId) -> StrideResult<Option<Module>> {
        Ok(self.read()?.modules.get(&id).cloned())
    }

    async fn skill_list(&self) -> StrideResult<Vec<SkillDefinition>> {
        let mut skills: Vec<_> = self.read()?.skills.values().cloned().collect();
        skills.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(skills)
    }

    async fn participation_get(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> StrideResult<Option<Participation>> {
        Ok(self
            .read()?
            .participations
            .get(&(user_id, activity_id))
            .cloned())
    }

    async fn module_progress_get(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> StrideResult<Option<ModuleProgress>> {
        Ok(self.read()?.progress.get(&(user_id, module_id)).cloned())
    }

    async fn quiz_attempt_list(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> StrideResult<Vec<QuizAttempt>> {
        Ok(self
            .read()?
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.module_id == module_id)
            .cloned()
            .collect())
    }

    async fn course_completion_get(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> StrideResult<Option<CourseCompletion>> {
        Ok(self.read()?.completions.get(&(user_id, course_id)).cloned())
    }

    async fn skill_aggregate_list(&self, user_id: UserId) -> StrideResult<Vec<SkillAggregate>> {
        let state = self.read()?;
        let mut aggregates: Vec<_> = state
            .aggregates
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        aggregates.sort_by_key(|a| a.skill_id);
        Ok(aggregates)
    }

    async fn ledger_entries(
        &self,
        user_id: UserId,
        skill_id: Option<SkillId>,
    ) -> StrideResult<Vec<LedgerEntry>> {
        Ok(self
            .read()?
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id && skill_id.map_or(true, |s| e.skill_id == s))
            .cloned()
            .collect())
    }

    async fn award(
        &self,
        user_id: UserId,
        source: GrantSource,
        now: Timestamp,
    ) -> StrideResult<AwardReceipt> {
        self.transact(|tx| apply_award(tx, user_id, source, now))
    }

    async fn check_in(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
        now: Timestamp,
    ) -> StrideResult<CheckInCommit> {
        self.transact(|tx| {
            let key = (user_id, activity_id);
            let Some(current) = tx.live.participations.get(&key) else {
                return Ok(CheckInCommit::NotParticipant);
            };
            if current.checked_in {
                let checked_at = current.checked_at.unwrap_or(current.joined_at);
                return Ok(CheckInCommit::AlreadyCheckedIn { checked_at });
            }
            let mut participation = current.clone();
            participation.checked_in = true;
            participation.checked_at = Some(now);
            tx.staged.participations.insert(key, participation);

            let award = apply_award(tx, user_id, GrantSource::Activity(activity_id), now)?;
            Ok(CheckInCommit::CheckedIn {
                checked_at: now,
                award,
            })
        })
    }

    async fn progress_commit(
        &self,
        commit: &ProgressCommit,
    ) -> StrideResult<ProgressCommitOutcome> {
        let user_id = commit.progress.user_id;
        let module_id = commit.progress.module_id;

        self.transact(|tx| {
            let key = (user_id, module_id);
            if let Some(outcome) = commit.precheck(tx.live.progress.get(&key)) {
                return Ok(outcome);
            }

            tx.staged.progress.insert(key, commit.progress.clone());
            if let Some(attempt) = &commit.attempt {
                tx.staged.attempts.push(attempt.clone());
            }

            let mut awards = CompletionAwards::default();
            if !commit.progress.completed {
                return Ok(ProgressCommitOutcome::Committed(awards));
            }

            awards.module = Some(apply_award(
                tx,
                user_id,
                GrantSource::Module(module_id),
                commit.now,
            )?);

            let course_key = (user_id, commit.course_id);
            if course_finished(tx, user_id, commit.course_id) && !tx.completion_exists(course_key)
            {
                tx.staged.completions.insert(
                    course_key,
                    CourseCompletion {
                        user_id,
                        course_id: commit.course_id,
                        completed_at: commit.now,
                    },
                );
                awards.course = Some(apply_award(
                    tx,
                    user_id,
                    GrantSource::Course(commit.course_id),
                    commit.now,
                )?);
            }

            Ok(ProgressCommitOutcome::Committed(awards))
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime")
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Aggregates always equal the sum of their ledger entries.
        #[test]
        fn prop_aggregate_matches_ledger(
            grants in prop::collection::vec((0usize..3, 0usize..3, 0i32..40), 1..8),
            awards in prop::collection::vec((0usize..3, 0usize..3), 0..30),
        ) {
            let rt = runtime();
            let store = MemoryStore::new();
            let skills: Vec<SkillDefinition> = (0..3)
                .map(|i| SkillDefinition {
                    skill_id: SkillId::now_v7(),
                    code: format!("C{}", i + 1),
                    name: format!("Skill {}", i + 1),
                    color: "#111111".to_string(),
                    description: None,
                })
                .collect();
            for skill in &skills {
                store.insert_skill(skill.clone()).unwrap();
            }
            let sources: Vec<GrantSource> = (0..3)
                .map(|_| GrantSource::Module(ModuleId::now_v7()))
                .collect();
            for (source, skill, points) in grants {
                store.insert_grant(Grant {
                    source: sources[source],
                    skill_id: skills[skill].skill_id,
                    points,
                }).unwrap();
            }
            let users: Vec<UserId> = (0..3).map(|_| UserId::now_v7()).collect();

            rt.block_on(async {
                for (user, source) in &awards {
                    store.award(users[*user], sources[*source], Utc::now()).await.unwrap();
                }
            });

            for user in &users {
                let aggregates = rt.block_on(store.skill_aggregate_list(*user)).unwrap();
                let ledger = rt.block_on(store.ledger_entries(*user, None)).unwrap();
                for aggregate in aggregates {
                    let sum: i64 = ledger
                        .iter()
                        .filter(|e| e.skill_id == aggregate.skill_id)
                        .map(|e| i64::from(e.points))
                        .sum();
                    prop_assert_eq!(aggregate.total_points, sum);
                    prop_assert_eq!(aggregate.level, level_for_points(sum));
                }
            }
        }
    }
}
