//! Module progression state machine
//!
//! The learner's stage inside a module is never stored. It is derived from
//! the independently settable fields of [`ModuleProgress`] by
//! [`resume_stage`], and every learner action is a pure transition from one
//! progress snapshot to the next via [`apply_action`]. Persistence and
//! awarding are left to the caller.

use crate::{
    score_answers, EntityIdType, Module, ModuleId, ModuleProgress, ModuleStage, QuizAttempt,
    QuizAttemptId, QuizScore, QuizType, Timestamp, UserId, ValidationError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Derive the resumable stage from persisted progress.
///
/// The order matters: a recorded test score means the learner is done with
/// the sequence even when that score failed, so a failed test resumes at
/// `Complete` and the learner resubmits from there.
pub fn resume_stage(progress: &ModuleProgress) -> ModuleStage {
    if progress.completed || progress.test_score.is_some() {
        ModuleStage::Complete
    } else if progress.video_completed {
        ModuleStage::Test
    } else if progress.pre_test_score.is_some() {
        ModuleStage::Video
    } else {
        ModuleStage::PreTest
    }
}

/// A learner action against one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressAction {
    SubmitQuiz {
        quiz_type: QuizType,
        answers: Vec<i32>,
    },
    CompleteVideo,
    Skip(ModuleStage),
}

/// Action not allowed from the current progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StageViolation {
    #[error("The pre-test has already been recorded")]
    PreTestAlreadyRecorded,

    #[error("The pre-test must be completed or skipped first")]
    PreTestPending,

    #[error("The video must be completed or skipped first")]
    VideoPending,

    #[error("This module has no {0} questions; skip the stage instead")]
    NoQuestions(QuizType),

    #[error("This module has no video; skip the stage instead")]
    NoVideo,

    #[error("The {0} stage has content and cannot be skipped")]
    StageHasContent(ModuleStage),

    #[error("The {0} stage cannot be skipped")]
    NotSkippable(ModuleStage),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressionError {
    #[error("Module already completed")]
    AlreadyCompleted,

    #[error(transparent)]
    InvalidState(#[from] StageViolation),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Outcome of a successful action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Progress to persist.
    pub progress: ModuleProgress,
    /// Audit record for a quiz submission, `None` for video and skips.
    pub attempt: Option<QuizAttempt>,
    pub score: Option<QuizScore>,
    /// True exactly when this action flipped `completed` to true.
    pub completed_now: bool,
}

/// Apply `action` to the current progress of `user` in `module`.
///
/// `current` is `None` when the learner has never touched the module.
pub fn apply_action(
    module: &Module,
    user_id: UserId,
    current: Option<&ModuleProgress>,
    action: &ProgressAction,
    now: Timestamp,
) -> Result<Transition, ProgressionError> {
    let mut progress = current
        .cloned()
        .unwrap_or_else(|| ModuleProgress::fresh(user_id, module.module_id, now));

    if progress.completed {
        return Err(ProgressionError::AlreadyCompleted);
    }

    let mut attempt = None;
    let mut score = None;

    match action {
        ProgressAction::SubmitQuiz { quiz_type, answers } => {
            require_stage_open(&progress, quiz_type.stage())?;
            let questions = module.questions(*quiz_type);
            if questions.is_empty() {
                return Err(StageViolation::NoQuestions(*quiz_type).into());
            }
            let result = score_answers(questions, answers)?;
            match quiz_type {
                QuizType::PreTest => {
                    progress.pre_test_score = Some(result.score);
                    progress.pre_test_total = Some(result.total);
                }
                QuizType::Test => {
                    progress.test_score = Some(result.score);
                    progress.test_total = Some(result.total);
                    if result.passed {
                        progress.completed = true;
                    }
                }
            }
            attempt = Some(QuizAttempt {
                attempt_id: QuizAttemptId::now_v7(),
                user_id,
                module_id: module.module_id,
                quiz_type: *quiz_type,
                answers: answers.clone(),
                score: result.score,
                total: result.total,
                passed: result.passed,
                submitted_at: now,
            });
            score = Some(result);
        }
        ProgressAction::CompleteVideo => {
            require_stage_open(&progress, ModuleStage::Video)?;
            if !module.has_video() {
                return Err(StageViolation::NoVideo.into());
            }
            progress.video_completed = true;
        }
        ProgressAction::Skip(stage) => {
            require_stage_open(&progress, *stage)?;
            if stage_has_content(module, *stage) {
                return Err(StageViolation::StageHasContent(*stage).into());
            }
            match stage {
                ModuleStage::PreTest => {
                    progress.pre_test_score = Some(0);
                    progress.pre_test_total = Some(0);
                }
                ModuleStage::Video => progress.video_completed = true,
                ModuleStage::Test => {
                    progress.test_score = Some(0);
                    progress.test_total = Some(0);
                    progress.completed = true;
                }
                ModuleStage::Complete => {
                    return Err(StageViolation::NotSkippable(*stage).into());
                }
            }
        }
    }

    progress.updated_at = now;
    Ok(Transition {
        completed_now: progress.completed,
        progress,
        attempt,
        score,
    })
}

/// Whether an action on `stage` is allowed given what is already recorded.
fn require_stage_open(progress: &ModuleProgress, stage: ModuleStage) -> Result<(), StageViolation> {
    match stage {
        ModuleStage::PreTest if progress.pre_test_score.is_some() => {
            Err(StageViolation::PreTestAlreadyRecorded)
        }
        ModuleStage::Video if progress.pre_test_score.is_none() => {
            Err(StageViolation::PreTestPending)
        }
        ModuleStage::Test if !progress.video_completed => Err(StageViolation::VideoPending),
        ModuleStage::Complete => Err(StageViolation::NotSkippable(ModuleStage::Complete)),
        _ => Ok(()),
    }
}

fn stage_has_content(module: &Module, stage: ModuleStage) -> bool {
    match stage {
        ModuleStage::PreTest => !module.pre_test.is_empty(),
        ModuleStage::Video => module.has_video(),
        ModuleStage::Test => !module.test.is_empty(),
        ModuleStage::Complete => false,
    }
}

/// Resumable view of a learner's progress in a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProgressView {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub module_id: ModuleId,
    pub stage: ModuleStage,
    pub pre_test_score: Option<i32>,
    pub pre_test_total: Option<i32>,
    pub video_completed: bool,
    pub test_score: Option<i32>,
    pub test_total: Option<i32>,
    pub completed: bool,
}

impl ProgressView {
    pub fn from_progress(progress: &ModuleProgress) -> Self {
        Self {
            module_id: progress.module_id,
            stage: resume_stage(progress),
            pre_test_score: progress.pre_test_score,
            pre_test_total: progress.pre_test_total,
            video_completed: progress.video_completed,
            test_score: progress.test_score,
            test_total: progress.test_total,
            completed: progress.completed,
        }
    }

    /// View for a learner with no stored progress.
    pub fn not_started(module_id: ModuleId) -> Self {
        Self {
            module_id,
            stage: ModuleStage::PreTest,
            pre_test_score: None,
            pre_test_total: None,
            video_completed: false,
            test_score: None,
            test_total: None,
            completed: false,
        }
    }
}
