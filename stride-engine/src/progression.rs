//! Module progression operations

use crate::{EngineError, EngineResult, LearningEngine};
use serde::{Deserialize, Serialize};
use stride_core::{
    apply_action, CompletionAwards, ModuleId, ModuleStage, ProgressAction, ProgressView,
    QuizAttempt, QuizType, SkillAward, Transition, UserId,
};
use stride_storage::{ProgressCommit, ProgressCommitOutcome};
use tracing::{debug, info};

/// Progress after a video completion or a skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StageUpdate {
    pub progress: ProgressView,
    /// True when this action completed the module.
    pub module_completed: bool,
    /// Module grants applied by this action.
    pub skills_awarded: Vec<SkillAward>,
    /// True when this action also completed the course.
    pub course_completed: bool,
    pub course_skills_awarded: Vec<SkillAward>,
}

impl StageUpdate {
    fn new(transition: &Transition, awards: CompletionAwards) -> Self {
        Self {
            progress: ProgressView::from_progress(&transition.progress),
            module_completed: transition.completed_now,
            skills_awarded: awards.module.map(|r| r.skills).unwrap_or_default(),
            course_completed: awards.course.is_some(),
            course_skills_awarded: awards.course.map(|r| r.skills).unwrap_or_default(),
        }
    }
}

/// Result of a scored quiz submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QuizSubmission {
    pub score: i32,
    pub total: i32,
    pub passed: bool,
    #[serde(flatten)]
    pub update: StageUpdate,
}

impl LearningEngine {
    /// Score and record a pre-test or test submission.
    pub async fn submit_module_quiz(
        &self,
        user_id: UserId,
        module_id: ModuleId,
        quiz_type: QuizType,
        answers: Vec<i32>,
    ) -> EngineResult<QuizSubmission> {
        let (transition, update) = self
            .advance(
                user_id,
                module_id,
                ProgressAction::SubmitQuiz { quiz_type, answers },
            )
            .await?;
        let score = transition.score.ok_or(EngineError::Internal)?;
        info!(
            %user_id,
            %module_id,
            %quiz_type,
            score = score.score,
            total = score.total,
            passed = score.passed,
            "quiz submitted"
        );
        Ok(QuizSubmission {
            score: score.score,
            total: score.total,
            passed: score.passed,
            update,
        })
    }

    /// Mark the module video as watched.
    pub async fn complete_video(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> EngineResult<StageUpdate> {
        let (_, update) = self
            .advance(user_id, module_id, ProgressAction::CompleteVideo)
            .await?;
        Ok(update)
    }

    /// Skip a stage that has no content configured.
    pub async fn skip_stage(
        &self,
        user_id: UserId,
        module_id: ModuleId,
        stage: ModuleStage,
    ) -> EngineResult<StageUpdate> {
        let (_, update) = self
            .advance(user_id, module_id, ProgressAction::Skip(stage))
            .await?;
        Ok(update)
    }

    /// Resumable progress; an untouched module resumes at the pre-test.
    pub async fn module_progress(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> EngineResult<ProgressView> {
        self.require_module(module_id).await?;
        let progress = self.store.module_progress_get(user_id, module_id).await?;
        Ok(progress
            .as_ref()
            .map(ProgressView::from_progress)
            .unwrap_or_else(|| ProgressView::not_started(module_id)))
    }

    /// Every quiz attempt of the learner in the module, oldest first.
    pub async fn quiz_attempts(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> EngineResult<Vec<QuizAttempt>> {
        self.require_module(module_id).await?;
        let mut attempts = self.store.quiz_attempt_list(user_id, module_id).await?;
        attempts.sort_by_key(|a| (a.submitted_at, a.attempt_id));
        Ok(attempts)
    }

    async fn require_module(&self, module_id: ModuleId) -> EngineResult<stride_core::Module> {
        self.store
            .module_get(module_id)
            .await?
            .ok_or_else(|| EngineError::not_found(module_id))
    }

    /// Validate `action` against stored progress and commit it.
    async fn advance(
        &self,
        user_id: UserId,
        module_id: ModuleId,
        action: ProgressAction,
    ) -> EngineResult<(Transition, StageUpdate)> {
        let now = self.now();
        let module = self.require_module(module_id).await?;
        let current = self.store.module_progress_get(user_id, module_id).await?;

        let transition = apply_action(&module, user_id, current.as_ref(), &action, now)
            .map_err(|err| {
                debug!(%user_id, %module_id, error = %err, "progression refused");
                EngineError::from(err)
            })?;

        let commit = ProgressCommit {
            expected: current,
            progress: transition.progress.clone(),
            attempt: transition.attempt.clone(),
            course_id: module.course_id,
            now,
        };
        let awards = match self.store.progress_commit(&commit).await? {
            ProgressCommitOutcome::Committed(awards) => awards,
            ProgressCommitOutcome::AlreadyCompleted => {
                debug!(%user_id, %module_id, "module completed concurrently");
                return Err(EngineError::conflict("Module already completed"));
            }
            ProgressCommitOutcome::Stale => {
                debug!(%user_id, %module_id, "module progress changed concurrently");
                return Err(EngineError::conflict(
                    "Module progress changed concurrently; reload and retry",
                ));
            }
        };

        if transition.completed_now {
            info!(
                %user_id,
                %module_id,
                points = awards.module.as_ref().map(|r| r.total_points()).unwrap_or(0),
                "module completed"
            );
        }
        if let Some(course) = &awards.course {
            info!(
                %user_id,
                course_id = %module.course_id,
                points = course.total_points(),
                "course completed"
            );
        }

        let update = StageUpdate::new(&transition, awards);
        Ok((transition, update))
    }
}
