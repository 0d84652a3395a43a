//! STRIDE Storage - Storage Trait and In-Memory Implementation
//!
//! Defines the persistence boundary of the engine. Reads are plain lookups;
//! every state change is a single atomic command so that the ledger, the
//! aggregates and the learner state never diverge. The Postgres
//! implementation lives in stride-api.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use stride_core::{
    Activity, ActivityId, AwardReceipt, CompletionAwards, CourseCompletion, CourseId,
    GrantSource, LedgerEntry, Module, ModuleId, ModuleProgress, QuizAttempt, SkillAggregate,
    Participation, SkillDefinition, SkillId, StrideResult, Timestamp, UserId,
};

// ============================================================================
// COMMAND TYPES
// ============================================================================

/// Outcome of the atomic check-in flip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInCommit {
    /// This call flipped the participation and applied the activity grants.
    CheckedIn {
        checked_at: Timestamp,
        award: AwardReceipt,
    },
    /// Someone already flipped it; nothing was written.
    AlreadyCheckedIn { checked_at: Timestamp },
    /// No participation row exists.
    NotParticipant,
}

/// Progress write for one module, plus its audit record.
///
/// The write is a compare-and-set: it only lands while the stored row still
/// equals `expected`, the snapshot the new progress was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressCommit {
    /// Stored row the transition started from; `None` for an untouched module.
    pub expected: Option<ModuleProgress>,
    pub progress: ModuleProgress,
    pub attempt: Option<QuizAttempt>,
    /// Course the module belongs to, checked for completion when the
    /// module completes.
    pub course_id: CourseId,
    pub now: Timestamp,
}

/// Outcome of [`LearningStore::progress_commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressCommitOutcome {
    Committed(CompletionAwards),
    /// The stored row was already completed; nothing was written.
    AlreadyCompleted,
    /// The stored row moved on since `expected` was read; nothing was written.
    Stale,
}

impl ProgressCommit {
    /// Outcome decided by the stored row alone, or `None` when the write
    /// may proceed.
    pub fn precheck(&self, stored: Option<&ModuleProgress>) -> Option<ProgressCommitOutcome> {
        if stored.is_some_and(|p| p.completed) {
            return Some(ProgressCommitOutcome::AlreadyCompleted);
        }
        if stored != self.expected.as_ref() {
            return Some(ProgressCommitOutcome::Stale);
        }
        None
    }
}

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Storage trait for learner state and the skill ledger.
///
/// Implementations must make each command all-or-nothing: on error nothing
/// it would have written is visible.
#[async_trait]
pub trait LearningStore: Send + Sync {
    // === Reference data ===

    async fn activity_get(&self, id: ActivityId) -> StrideResult<Option<Activity>>;

    async fn module_get(&self, id: ModuleId) -> StrideResult<Option<Module>>;

    /// All skill definitions, ordered by code.
    async fn skill_list(&self) -> StrideResult<Vec<SkillDefinition>>;

    // === Learner state ===

    async fn participation_get(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> StrideResult<Option<Participation>>;

    async fn module_progress_get(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> StrideResult<Option<ModuleProgress>>;

    /// Attempts for one module, oldest first.
    async fn quiz_attempt_list(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> StrideResult<Vec<QuizAttempt>>;

    async fn course_completion_get(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> StrideResult<Option<CourseCompletion>>;

    // === Skill ledger ===

    async fn skill_aggregate_list(&self, user_id: UserId) -> StrideResult<Vec<SkillAggregate>>;

    /// Ledger entries of a user, oldest first, optionally for one skill.
    async fn ledger_entries(
        &self,
        user_id: UserId,
        skill_id: Option<SkillId>,
    ) -> StrideResult<Vec<LedgerEntry>>;

    // === Atomic commands ===

    /// Apply every grant of `source` to `user_id` in one transaction.
    ///
    /// Not idempotent: callers guarantee one call per logical completion.
    async fn award(
        &self,
        user_id: UserId,
        source: GrantSource,
        now: Timestamp,
    ) -> StrideResult<AwardReceipt>;

    /// Flip the participation to checked in and award the activity grants,
    /// atomically. The flip only happens if it is still pending.
    async fn check_in(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
        now: Timestamp,
    ) -> StrideResult<CheckInCommit>;

    /// Persist module progress and its attempt, conditional on the stored
    /// row being exactly `commit.expected` and not completed. When the write completes the module the
    /// module grants are awarded, and when it completes the course the
    /// course completion is recorded and course grants awarded once.
    async fn progress_commit(&self, commit: &ProgressCommit)
        -> StrideResult<ProgressCommitOutcome>;
}
