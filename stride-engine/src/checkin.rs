//! Activity self check-in

use crate::{EngineError, EngineResult, LearningEngine};
use serde::{Deserialize, Serialize};
use stride_core::{
    check_in_status, evaluate_check_in, ActivityId, CheckInStatus, SkillAward, Timestamp, UserId,
};
use stride_storage::CheckInCommit;
use tracing::{debug, info};

/// Result of a successful self check-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CheckInResult {
    pub checked_in: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub checked_at: Timestamp,
    pub skills_awarded: Vec<SkillAward>,
}

impl LearningEngine {
    /// Check the learner in to an activity and award its skill points.
    ///
    /// Preconditions are checked in order: participation, start, end, not
    /// yet checked in. The store flip is authoritative, so a racing second
    /// request is refused even if both passed the precondition read.
    pub async fn self_check_in(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> EngineResult<CheckInResult> {
        let now = self.now();
        let activity = self
            .store
            .activity_get(activity_id)
            .await?
            .ok_or_else(|| EngineError::not_found(activity_id))?;
        let participation = self.store.participation_get(user_id, activity_id).await?;

        if let Err(refusal) = evaluate_check_in(participation.as_ref(), &activity, now) {
            debug!(%user_id, %activity_id, reason = %refusal, "check-in refused");
            return Err(refusal.into());
        }

        match self.store.check_in(user_id, activity_id, now).await? {
            CheckInCommit::CheckedIn { checked_at, award } => {
                info!(
                    %user_id,
                    %activity_id,
                    points = award.total_points(),
                    skills = award.skills.len(),
                    "checked in"
                );
                Ok(CheckInResult {
                    checked_in: true,
                    checked_at,
                    skills_awarded: award.skills,
                })
            }
            CheckInCommit::AlreadyCheckedIn { checked_at } => {
                debug!(%user_id, %activity_id, "check-in lost race to an earlier flip");
                Err(stride_core::CheckInRefusal::AlreadyCheckedIn { checked_at }.into())
            }
            CheckInCommit::NotParticipant => {
                Err(stride_core::CheckInRefusal::NotParticipant.into())
            }
        }
    }

    /// Read-only check-in state of a learner for one activity.
    pub async fn check_in_status(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> EngineResult<CheckInStatus> {
        let activity = self
            .store
            .activity_get(activity_id)
            .await?
            .ok_or_else(|| EngineError::not_found(activity_id))?;
        let participation = self.store.participation_get(user_id, activity_id).await?;
        Ok(check_in_status(participation.as_ref(), &activity, self.now()))
    }
}
