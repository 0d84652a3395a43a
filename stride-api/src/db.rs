//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres and the Postgres
//! implementation of [`LearningStore`].
//!
//! Every command of the trait runs in a single transaction. Concurrency is
//! handled by the statements themselves: the check-in flip is a conditional
//! `UPDATE`, aggregate increments are an upsert with increment, and progress
//! writes lock the stored row and only land if it still matches the snapshot
//! the new progress was computed from. A second racing command therefore
//! observes the first one's result instead of repeating its awards.

use crate::config::parse_var;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime, Transaction};
use once_cell::sync::Lazy;
use std::time::Duration;
use stride_core::{
    level_for_points, Activity, ActivityId, AwardReceipt, CompletionAwards, ConfigError, Course,
    CourseCompletion, CourseId, EntityIdType, Grant, GrantSource, LedgerEntry, LedgerEntryId,
    Module, ModuleId, ModuleProgress, Participation, QuizAttempt, QuizQuestion, QuizType,
    SkillAggregate, SkillAward, SkillDefinition, SkillId, SourceKind, StorageError, StrideError,
    StrideResult, Timestamp, UserId, LEVEL_CEILINGS, MAX_LEVEL,
};
use stride_storage::{CheckInCommit, LearningStore, ProgressCommit, ProgressCommitOutcome};
use tokio_postgres::types::{Json, ToSql};
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

/// Schema applied by [`DbClient::migrate`].
const SCHEMA_SQL: &str = include_str!("../sql/schema.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait/connect timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "stride".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: lookup("STRIDE_DB_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "STRIDE_DB_PORT", defaults.port)?,
            dbname: lookup("STRIDE_DB_NAME").unwrap_or(defaults.dbname),
            user: lookup("STRIDE_DB_USER").unwrap_or(defaults.user),
            password: lookup("STRIDE_DB_PASSWORD").unwrap_or_default(),
            max_size: parse_var(&lookup, "STRIDE_DB_POOL_SIZE", defaults.max_size)?,
            timeout: Duration::from_secs(parse_var(
                &lookup,
                "STRIDE_DB_TIMEOUT",
                defaults.timeout.as_secs(),
            )?),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::service_unavailable(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// ERROR HELPERS
// ============================================================================

fn db_err(err: tokio_postgres::Error) -> StrideError {
    StorageError::Backend {
        reason: err.to_string(),
    }
    .into()
}

fn pool_err(err: deadpool_postgres::PoolError) -> StrideError {
    StorageError::Backend {
        reason: format!("connection pool: {}", err),
    }
    .into()
}

fn tx_err(err: tokio_postgres::Error) -> StrideError {
    StorageError::TransactionFailed {
        reason: err.to_string(),
    }
    .into()
}

fn decode_err(what: &str, reason: impl std::fmt::Display) -> StrideError {
    StorageError::Backend {
        reason: format!("undecodable {}: {}", what, reason),
    }
    .into()
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn row_to_skill(row: &Row) -> StrideResult<SkillDefinition> {
    Ok(SkillDefinition {
        skill_id: SkillId::new(row.try_get("skill_id").map_err(db_err)?),
        code: row.try_get("code").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        color: row.try_get("color").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
    })
}

fn row_to_activity(row: &Row) -> StrideResult<Activity> {
    Ok(Activity {
        activity_id: ActivityId::new(row.try_get("activity_id").map_err(db_err)?),
        title: row.try_get("title").map_err(db_err)?,
        start_date: row.try_get("start_date").map_err(db_err)?,
        end_date: row.try_get("end_date").map_err(db_err)?,
    })
}

fn row_to_module(row: &Row) -> StrideResult<Module> {
    let pre_test: Json<Vec<QuizQuestion>> = row.try_get("pre_test").map_err(db_err)?;
    let test: Json<Vec<QuizQuestion>> = row.try_get("test").map_err(db_err)?;
    Ok(Module {
        module_id: ModuleId::new(row.try_get("module_id").map_err(db_err)?),
        course_id: CourseId::new(row.try_get("course_id").map_err(db_err)?),
        title: row.try_get("title").map_err(db_err)?,
        position: row.try_get("position").map_err(db_err)?,
        pre_test: pre_test.0,
        video_url: row.try_get("video_url").map_err(db_err)?,
        test: test.0,
    })
}

fn row_to_source(row: &Row) -> StrideResult<GrantSource> {
    let kind: String = row.try_get("source_kind").map_err(db_err)?;
    let kind = SourceKind::from_db_str(&kind).map_err(|e| decode_err("source kind", e))?;
    Ok(GrantSource::from_parts(
        kind,
        row.try_get("source_id").map_err(db_err)?,
    ))
}

fn row_to_participation(row: &Row) -> StrideResult<Participation> {
    Ok(Participation {
        user_id: UserId::new(row.try_get("user_id").map_err(db_err)?),
        activity_id: ActivityId::new(row.try_get("activity_id").map_err(db_err)?),
        joined_at: row.try_get("joined_at").map_err(db_err)?,
        checked_in: row.try_get("checked_in").map_err(db_err)?,
        checked_at: row.try_get("checked_at").map_err(db_err)?,
    })
}

fn row_to_progress(row: &Row) -> StrideResult<ModuleProgress> {
    Ok(ModuleProgress {
        user_id: UserId::new(row.try_get("user_id").map_err(db_err)?),
        module_id: ModuleId::new(row.try_get("module_id").map_err(db_err)?),
        pre_test_score: row.try_get("pre_test_score").map_err(db_err)?,
        pre_test_total: row.try_get("pre_test_total").map_err(db_err)?,
        video_completed: row.try_get("video_completed").map_err(db_err)?,
        test_score: row.try_get("test_score").map_err(db_err)?,
        test_total: row.try_get("test_total").map_err(db_err)?,
        completed: row.try_get("completed").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn row_to_attempt(row: &Row) -> StrideResult<QuizAttempt> {
    let quiz_type: String = row.try_get("quiz_type").map_err(db_err)?;
    Ok(QuizAttempt {
        attempt_id: stride_core::QuizAttemptId::new(row.try_get("attempt_id").map_err(db_err)?),
        user_id: UserId::new(row.try_get("user_id").map_err(db_err)?),
        module_id: ModuleId::new(row.try_get("module_id").map_err(db_err)?),
        quiz_type: QuizType::from_db_str(&quiz_type).map_err(|e| decode_err("quiz type", e))?,
        answers: row.try_get("answers").map_err(db_err)?,
        score: row.try_get("score").map_err(db_err)?,
        total: row.try_get("total").map_err(db_err)?,
        passed: row.try_get("passed").map_err(db_err)?,
        submitted_at: row.try_get("submitted_at").map_err(db_err)?,
    })
}

fn row_to_ledger_entry(row: &Row) -> StrideResult<LedgerEntry> {
    Ok(LedgerEntry {
        entry_id: LedgerEntryId::new(row.try_get("entry_id").map_err(db_err)?),
        user_id: UserId::new(row.try_get("user_id").map_err(db_err)?),
        skill_id: SkillId::new(row.try_get("skill_id").map_err(db_err)?),
        source: row_to_source(row)?,
        points: row.try_get("points").map_err(db_err)?,
        awarded_at: row.try_get("awarded_at").map_err(db_err)?,
    })
}

fn row_to_aggregate(row: &Row) -> StrideResult<SkillAggregate> {
    Ok(SkillAggregate {
        user_id: UserId::new(row.try_get("user_id").map_err(db_err)?),
        skill_id: SkillId::new(row.try_get("skill_id").map_err(db_err)?),
        total_points: row.try_get("total_points").map_err(db_err)?,
        level: row.try_get("level").map_err(db_err)?,
        last_updated: row.try_get("last_updated").map_err(db_err)?,
    })
}

// ============================================================================
// TRANSACTION STEPS
// ============================================================================

/// `CASE` expression classifying the points total `total` exactly like
/// [`level_for_points`].
fn level_case_sql(total: &str) -> String {
    let arms: String = LEVEL_CEILINGS
        .iter()
        .enumerate()
        .map(|(level, ceiling)| format!("WHEN {total} <= {ceiling} THEN {level} "))
        .collect();
    format!("CASE {arms}ELSE {MAX_LEVEL} END")
}

/// Upsert-increment of one aggregate. The level follows the new total in
/// the same statement.
static AGGREGATE_INCREMENT_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "INSERT INTO stride_skill_aggregates
             (user_id, skill_id, total_points, level, last_updated)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (user_id, skill_id) DO UPDATE
         SET total_points = stride_skill_aggregates.total_points + EXCLUDED.total_points,
             level = {},
             last_updated = EXCLUDED.last_updated
         RETURNING total_points, level",
        level_case_sql("stride_skill_aggregates.total_points + EXCLUDED.total_points")
    )
});

/// Append ledger rows and bump aggregates for every grant of `source`.
async fn award_in(
    tx: &Transaction<'_>,
    user_id: UserId,
    source: GrantSource,
    now: Timestamp,
) -> StrideResult<AwardReceipt> {
    let user = user_id.as_uuid();
    let kind = source.kind().as_db_str();
    let source_id = source.source_uuid();

    let rows = tx
        .query(
            "SELECT s.skill_id, s.code, s.name, s.color, s.description, g.points
             FROM stride_grants g
             JOIN stride_skills s ON s.skill_id = g.skill_id
             WHERE g.source_kind = $1 AND g.source_id = $2
             ORDER BY s.code",
            &[&kind, &source_id],
        )
        .await
        .map_err(db_err)?;

    let mut skills = Vec::with_capacity(rows.len());
    for row in &rows {
        let skill = row_to_skill(row)?;
        let points: i32 = row.try_get("points").map_err(db_err)?;
        let skill_uuid = skill.skill_id.as_uuid();

        tx.execute(
            "INSERT INTO stride_skill_ledger
                 (entry_id, user_id, skill_id, source_kind, source_id, points, awarded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &Uuid::now_v7(),
                &user,
                &skill_uuid,
                &kind,
                &source_id,
                &points,
                &now,
            ],
        )
        .await
        .map_err(db_err)?;

        let increment = i64::from(points);
        let total_row = tx
            .query_one(
                AGGREGATE_INCREMENT_SQL.as_str(),
                &[
                    &user,
                    &skill_uuid,
                    &increment,
                    &level_for_points(increment),
                    &now,
                ],
            )
            .await
            .map_err(db_err)?;
        let total_points: i64 = total_row.try_get("total_points").map_err(db_err)?;
        let level: i16 = total_row.try_get("level").map_err(db_err)?;

        let aggregate = SkillAggregate {
            user_id,
            skill_id: skill.skill_id,
            total_points,
            level,
            last_updated: now,
        };
        skills.push(SkillAward::new(&skill, points, &aggregate));
    }

    Ok(AwardReceipt::from_skills(skills))
}

/// True when every module of the course is completed by the learner.
/// A course without modules is never finished.
async fn course_finished_in(
    tx: &Transaction<'_>,
    user_id: UserId,
    course_id: CourseId,
) -> StrideResult<bool> {
    let row = tx
        .query_one(
            "SELECT COUNT(*) AS modules,
                    COUNT(*) FILTER (WHERE p.completed) AS completed
             FROM stride_modules m
             LEFT JOIN stride_module_progress p
               ON p.module_id = m.module_id AND p.user_id = $1
             WHERE m.course_id = $2",
            &[&user_id.as_uuid(), &course_id.as_uuid()],
        )
        .await
        .map_err(db_err)?;
    let modules: i64 = row.try_get("modules").map_err(db_err)?;
    let completed: i64 = row.try_get("completed").map_err(db_err)?;
    Ok(modules > 0 && modules == completed)
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Postgres-backed [`LearningStore`] over a connection pool.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> StrideResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_err)
    }

    /// Apply the bundled schema.
    pub async fn migrate(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA_SQL).await.map_err(|e| {
            tracing::error!(error = %e, "schema migration failed");
            ApiError::service_unavailable("Failed to apply database schema")
        })?;
        tracing::info!("database schema applied");
        Ok(())
    }

    /// Round-trip a trivial query.
    pub async fn health_check(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.query_one("SELECT 1", &[])
            .await
            .map_err(|e| ApiError::service_unavailable(format!("Database check failed: {}", e)))?;
        Ok(())
    }

    // ========================================================================
    // REFERENCE DATA WRITES
    // ========================================================================
    // Authoring belongs to other services; these upserts exist for seeding
    // and integration tests.

    pub async fn upsert_skill(&self, skill: &SkillDefinition) -> StrideResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO stride_skills (skill_id, code, name, color, description)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (skill_id) DO UPDATE
             SET code = EXCLUDED.code, name = EXCLUDED.name,
                 color = EXCLUDED.color, description = EXCLUDED.description",
            &[
                &skill.skill_id.as_uuid(),
                &skill.code,
                &skill.name,
                &skill.color,
                &skill.description,
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn upsert_activity(&self, activity: &Activity) -> StrideResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO stride_activities (activity_id, title, start_date, end_date)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (activity_id) DO UPDATE
             SET title = EXCLUDED.title, start_date = EXCLUDED.start_date,
                 end_date = EXCLUDED.end_date",
            &[
                &activity.activity_id.as_uuid(),
                &activity.title,
                &activity.start_date,
                &activity.end_date,
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn upsert_course(&self, course: &Course) -> StrideResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO stride_courses (course_id, title) VALUES ($1, $2)
             ON CONFLICT (course_id) DO UPDATE SET title = EXCLUDED.title",
            &[&course.course_id.as_uuid(), &course.title],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn upsert_module(&self, module: &Module) -> StrideResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO stride_modules
                 (module_id, course_id, title, position, pre_test, video_url, test)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (module_id) DO UPDATE
             SET course_id = EXCLUDED.course_id, title = EXCLUDED.title,
                 position = EXCLUDED.position, pre_test = EXCLUDED.pre_test,
                 video_url = EXCLUDED.video_url, test = EXCLUDED.test",
            &[
                &module.module_id.as_uuid(),
                &module.course_id.as_uuid(),
                &module.title,
                &module.position,
                &Json(&module.pre_test),
                &module.video_url,
                &Json(&module.test),
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Add or replace the grant of a source for one skill.
    pub async fn upsert_grant(&self, grant: &Grant) -> StrideResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO stride_grants (source_kind, source_id, skill_id, points)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (source_kind, source_id, skill_id) DO UPDATE
             SET points = EXCLUDED.points",
            &[
                &grant.source.kind().as_db_str(),
                &grant.source.source_uuid(),
                &grant.skill_id.as_uuid(),
                &grant.points,
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Record that a learner joined an activity. Joining twice is a no-op.
    pub async fn join_activity(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
        joined_at: Timestamp,
    ) -> StrideResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO stride_participations (user_id, activity_id, joined_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (user_id, activity_id) DO NOTHING",
            &[&user_id.as_uuid(), &activity_id.as_uuid(), &joined_at],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl LearningStore for DbClient {
    async fn activity_get(&self, id: ActivityId) -> StrideResult<Option<Activity>> {
        let conn = self.get_conn().await?;
        conn.query_opt(
            "SELECT activity_id, title, start_date, end_date
             FROM stride_activities WHERE activity_id = $1",
            &[&id.as_uuid()],
        )
        .await
        .map_err(db_err)?
        .as_ref()
        .map(row_to_activity)
        .transpose()
    }

    async fn module_get(&self, id: ModuleId) -> StrideResult<Option<Module>> {
        let conn = self.get_conn().await?;
        conn.query_opt(
            "SELECT module_id, course_id, title, position, pre_test, video_url, test
             FROM stride_modules WHERE module_id = $1",
            &[&id.as_uuid()],
        )
        .await
        .map_err(db_err)?
        .as_ref()
        .map(row_to_module)
        .transpose()
    }

    async fn skill_list(&self) -> StrideResult<Vec<SkillDefinition>> {
        let conn = self.get_conn().await?;
        conn.query(
            "SELECT skill_id, code, name, color, description
             FROM stride_skills ORDER BY code",
            &[],
        )
        .await
        .map_err(db_err)?
        .iter()
        .map(row_to_skill)
        .collect()
    }

    async fn participation_get(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> StrideResult<Option<Participation>> {
        let conn = self.get_conn().await?;
        conn.query_opt(
            "SELECT user_id, activity_id, joined_at, checked_in, checked_at
             FROM stride_participations WHERE user_id = $1 AND activity_id = $2",
            &[&user_id.as_uuid(), &activity_id.as_uuid()],
        )
        .await
        .map_err(db_err)?
        .as_ref()
        .map(row_to_participation)
        .transpose()
    }

    async fn module_progress_get(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> StrideResult<Option<ModuleProgress>> {
        let conn = self.get_conn().await?;
        conn.query_opt(
            "SELECT user_id, module_id, pre_test_score, pre_test_total, video_completed,
                    test_score, test_total, completed, updated_at
             FROM stride_module_progress WHERE user_id = $1 AND module_id = $2",
            &[&user_id.as_uuid(), &module_id.as_uuid()],
        )
        .await
        .map_err(db_err)?
        .as_ref()
        .map(row_to_progress)
        .transpose()
    }

    async fn quiz_attempt_list(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> StrideResult<Vec<QuizAttempt>> {
        let conn = self.get_conn().await?;
        conn.query(
            "SELECT attempt_id, user_id, module_id, quiz_type, answers, score, total, passed,
                    submitted_at
             FROM stride_quiz_attempts
             WHERE user_id = $1 AND module_id = $2
             ORDER BY submitted_at, attempt_id",
            &[&user_id.as_uuid(), &module_id.as_uuid()],
        )
        .await
        .map_err(db_err)?
        .iter()
        .map(row_to_attempt)
        .collect()
    }

    async fn course_completion_get(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> StrideResult<Option<CourseCompletion>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT completed_at FROM stride_course_completions
                 WHERE user_id = $1 AND course_id = $2",
                &[&user_id.as_uuid(), &course_id.as_uuid()],
            )
            .await
            .map_err(db_err)?;
        match row {
            None => Ok(None),
            Some(row) => Ok(Some(CourseCompletion {
                user_id,
                course_id,
                completed_at: row.try_get("completed_at").map_err(db_err)?,
            })),
        }
    }

    async fn skill_aggregate_list(&self, user_id: UserId) -> StrideResult<Vec<SkillAggregate>> {
        let conn = self.get_conn().await?;
        conn.query(
            "SELECT user_id, skill_id, total_points, level, last_updated
             FROM stride_skill_aggregates WHERE user_id = $1 ORDER BY skill_id",
            &[&user_id.as_uuid()],
        )
        .await
        .map_err(db_err)?
        .iter()
        .map(row_to_aggregate)
        .collect()
    }

    async fn ledger_entries(
        &self,
        user_id: UserId,
        skill_id: Option<SkillId>,
    ) -> StrideResult<Vec<LedgerEntry>> {
        let conn = self.get_conn().await?;
        let skill = skill_id.map(|s| s.as_uuid());
        conn.query(
            "SELECT entry_id, user_id, skill_id, source_kind, source_id, points, awarded_at
             FROM stride_skill_ledger
             WHERE user_id = $1 AND ($2::uuid IS NULL OR skill_id = $2)
             ORDER BY awarded_at, entry_id",
            &[&user_id.as_uuid(), &skill],
        )
        .await
        .map_err(db_err)?
        .iter()
        .map(row_to_ledger_entry)
        .collect()
    }

    async fn award(
        &self,
        user_id: UserId,
        source: GrantSource,
        now: Timestamp,
    ) -> StrideResult<AwardReceipt> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(tx_err)?;
        let receipt = award_in(&tx, user_id, source, now).await?;
        tx.commit().await.map_err(tx_err)?;
        Ok(receipt)
    }

    async fn check_in(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
        now: Timestamp,
    ) -> StrideResult<CheckInCommit> {
        let user = user_id.as_uuid();
        let activity = activity_id.as_uuid();

        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(tx_err)?;

        let flipped = tx
            .query_opt(
                "UPDATE stride_participations
                 SET checked_in = TRUE, checked_at = $3
                 WHERE user_id = $1 AND activity_id = $2 AND checked_in = FALSE
                 RETURNING checked_at",
                &[&user, &activity, &now],
            )
            .await
            .map_err(db_err)?;

        let Some(row) = flipped else {
            // Nothing flipped; find out why. The transaction is dropped,
            // which rolls it back.
            let existing = tx
                .query_opt(
                    "SELECT joined_at, checked_at FROM stride_participations
                     WHERE user_id = $1 AND activity_id = $2",
                    &[&user, &activity],
                )
                .await
                .map_err(db_err)?;
            return match existing {
                None => Ok(CheckInCommit::NotParticipant),
                Some(row) => {
                    let joined_at: Timestamp = row.try_get("joined_at").map_err(db_err)?;
                    let checked_at: Option<Timestamp> =
                        row.try_get("checked_at").map_err(db_err)?;
                    Ok(CheckInCommit::AlreadyCheckedIn {
                        checked_at: checked_at.unwrap_or(joined_at),
                    })
                }
            };
        };
        let checked_at: Timestamp = row.try_get("checked_at").map_err(db_err)?;

        let award = award_in(&tx, user_id, GrantSource::Activity(activity_id), checked_at).await?;
        tx.commit().await.map_err(tx_err)?;

        Ok(CheckInCommit::CheckedIn { checked_at, award })
    }

    async fn progress_commit(
        &self,
        commit: &ProgressCommit,
    ) -> StrideResult<ProgressCommitOutcome> {
        let progress = &commit.progress;
        let user_id = progress.user_id;
        let module_id = progress.module_id;
        let user = user_id.as_uuid();
        let module = module_id.as_uuid();

        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(tx_err)?;

        let stored = tx
            .query_opt(
                "SELECT user_id, module_id, pre_test_score, pre_test_total, video_completed,
                        test_score, test_total, completed, updated_at
                 FROM stride_module_progress WHERE user_id = $1 AND module_id = $2
                 FOR UPDATE",
                &[&user, &module],
            )
            .await
            .map_err(db_err)?
            .as_ref()
            .map(row_to_progress)
            .transpose()?;
        if let Some(outcome) = commit.precheck(stored.as_ref()) {
            return Ok(outcome);
        }

        let params: [&(dyn ToSql + Sync); 9] = [
            &user,
            &module,
            &progress.pre_test_score,
            &progress.pre_test_total,
            &progress.video_completed,
            &progress.test_score,
            &progress.test_total,
            &progress.completed,
            &progress.updated_at,
        ];
        // An existing row is locked above. A missing one cannot be locked, so
        // a concurrent first write shows up as a conflicting insert.
        let written = if stored.is_some() {
            tx.execute(
                "UPDATE stride_module_progress
                 SET pre_test_score = $3, pre_test_total = $4, video_completed = $5,
                     test_score = $6, test_total = $7, completed = $8, updated_at = $9
                 WHERE user_id = $1 AND module_id = $2",
                &params,
            )
            .await
        } else {
            tx.execute(
                "INSERT INTO stride_module_progress
                     (user_id, module_id, pre_test_score, pre_test_total, video_completed,
                      test_score, test_total, completed, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (user_id, module_id) DO NOTHING",
                &params,
            )
            .await
        }
        .map_err(db_err)?;
        if written == 0 {
            return Ok(ProgressCommitOutcome::Stale);
        }

        if let Some(attempt) = &commit.attempt {
            tx.execute(
                "INSERT INTO stride_quiz_attempts
                     (attempt_id, user_id, module_id, quiz_type, answers, score, total,
                      passed, submitted_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &attempt.attempt_id.as_uuid(),
                    &user,
                    &module,
                    &attempt.quiz_type.as_db_str(),
                    &attempt.answers,
                    &attempt.score,
                    &attempt.total,
                    &attempt.passed,
                    &attempt.submitted_at,
                ],
            )
            .await
            .map_err(db_err)?;
        }

        let mut awards = CompletionAwards::default();
        if progress.completed {
            // Serialize completions per course so that two modules finishing
            // concurrently cannot both miss the other. Taken before any
            // aggregate row lock to keep the lock order fixed.
            tx.execute(
                "SELECT 1 FROM stride_courses WHERE course_id = $1 FOR UPDATE",
                &[&commit.course_id.as_uuid()],
            )
            .await
            .map_err(db_err)?;

            awards.module = Some(
                award_in(&tx, user_id, GrantSource::Module(module_id), commit.now).await?,
            );

            if course_finished_in(&tx, user_id, commit.course_id).await? {
                let inserted = tx
                    .execute(
                        "INSERT INTO stride_course_completions (user_id, course_id, completed_at)
                         VALUES ($1, $2, $3)
                         ON CONFLICT (user_id, course_id) DO NOTHING",
                        &[&user, &commit.course_id.as_uuid(), &commit.now],
                    )
                    .await
                    .map_err(db_err)?;
                if inserted == 1 {
                    awards.course = Some(
                        award_in(&tx, user_id, GrantSource::Course(commit.course_id), commit.now)
                            .await?,
                    );
                }
            }
        }

        tx.commit().await.map_err(tx_err)?;
        Ok(ProgressCommitOutcome::Committed(awards))
    }
}
