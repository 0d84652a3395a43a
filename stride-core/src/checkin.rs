//! Check-in window evaluation

use crate::{Activity, ActivityStatus, Participation, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a self check-in is refused. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CheckInRefusal {
    #[error("You must join this activity before checking in")]
    NotParticipant,

    #[error("This activity has not started yet")]
    NotStarted,

    #[error("This activity has already ended")]
    AlreadyEnded,

    #[error("You have already checked in to this activity")]
    AlreadyCheckedIn { checked_at: Timestamp },
}

/// Where `now` falls relative to the activity window. Both bounds inclusive.
pub fn activity_status(activity: &Activity, now: Timestamp) -> ActivityStatus {
    if now < activity.start_date {
        ActivityStatus::Upcoming
    } else if activity.end_date.is_some_and(|end| now > end) {
        ActivityStatus::Ended
    } else {
        ActivityStatus::Ongoing
    }
}

/// Run the check-in preconditions, first failure wins.
pub fn evaluate_check_in(
    participation: Option<&Participation>,
    activity: &Activity,
    now: Timestamp,
) -> Result<(), CheckInRefusal> {
    let participation = participation.ok_or(CheckInRefusal::NotParticipant)?;

    match activity_status(activity, now) {
        ActivityStatus::Upcoming => return Err(CheckInRefusal::NotStarted),
        ActivityStatus::Ended => return Err(CheckInRefusal::AlreadyEnded),
        ActivityStatus::Ongoing => {}
    }

    if participation.checked_in {
        // checked_at is always set alongside checked_in; fall back to the
        // join time rather than inventing a value
        let checked_at = participation.checked_at.unwrap_or(participation.joined_at);
        return Err(CheckInRefusal::AlreadyCheckedIn { checked_at });
    }

    Ok(())
}

/// Read-only view of a learner's check-in state for one activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CheckInStatus {
    pub is_participant: bool,
    pub checked_in: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub checked_at: Option<Timestamp>,
    /// True only for a participant who has not checked in, while the
    /// activity is ongoing. Being inside the window is not enough on its own.
    pub can_check_in: bool,
    pub activity_status: ActivityStatus,
}

/// Build the status view. A non-participant can never check in.
pub fn check_in_status(
    participation: Option<&Participation>,
    activity: &Activity,
    now: Timestamp,
) -> CheckInStatus {
    let activity_status = activity_status(activity, now);
    let checked_in = participation.map(|p| p.checked_in).unwrap_or(false);
    CheckInStatus {
        is_participant: participation.is_some(),
        checked_in,
        checked_at: participation.and_then(|p| p.checked_at),
        can_check_in: participation.is_some()
            && activity_status == ActivityStatus::Ongoing
            && !checked_in,
        activity_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActivityId, EntityIdType, UserId};
    use chrono::{Duration, TimeZone, Utc};

    fn base() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn activity(end: Option<Timestamp>) -> Activity {
        Activity {
            activity_id: ActivityId::now_v7(),
            title: "Campus cleanup".to_string(),
            start_date: base(),
            end_date: end,
        }
    }

    fn joined(activity: &Activity) -> Participation {
        Participation::joined(UserId::now_v7(), activity.activity_id, base() - Duration::days(2))
    }

    #[test]
    fn test_status_window_is_inclusive() {
        let end = base() + Duration::hours(3);
        let a = activity(Some(end));
        assert_eq!(activity_status(&a, base() - Duration::seconds(1)), ActivityStatus::Upcoming);
        assert_eq!(activity_status(&a, base()), ActivityStatus::Ongoing);
        assert_eq!(activity_status(&a, end), ActivityStatus::Ongoing);
        assert_eq!(activity_status(&a, end + Duration::seconds(1)), ActivityStatus::Ended);
    }

    #[test]
    fn test_open_ended_activity_never_ends() {
        let a = activity(None);
        assert_eq!(
            activity_status(&a, base() + Duration::days(3650)),
            ActivityStatus::Ongoing
        );
    }

    #[test]
    fn test_non_participant_refused_first() {
        // Even outside the window, missing participation wins.
        let a = activity(Some(base() + Duration::hours(1)));
        let err = evaluate_check_in(None, &a, base() - Duration::days(1)).unwrap_err();
        assert_eq!(err, CheckInRefusal::NotParticipant);
    }

    #[test]
    fn test_temporal_gate() {
        let a = activity(Some(base() + Duration::hours(1)));
        let p = joined(&a);
        assert_eq!(
            evaluate_check_in(Some(&p), &a, base() - Duration::minutes(1)),
            Err(CheckInRefusal::NotStarted)
        );
        assert_eq!(
            evaluate_check_in(Some(&p), &a, base() + Duration::hours(2)),
            Err(CheckInRefusal::AlreadyEnded)
        );
        assert_eq!(
            evaluate_check_in(Some(&p), &a, base() + Duration::minutes(30)),
            Ok(())
        );
    }

    #[test]
    fn test_already_checked_in_carries_original_time() {
        let a = activity(None);
        let mut p = joined(&a);
        let first = base() + Duration::minutes(5);
        p.checked_in = true;
        p.checked_at = Some(first);

        let err = evaluate_check_in(Some(&p), &a, base() + Duration::hours(1)).unwrap_err();
        assert_eq!(err, CheckInRefusal::AlreadyCheckedIn { checked_at: first });
    }

    #[test]
    fn test_status_for_non_participant_in_open_window() {
        let a = activity(None);
        let status = check_in_status(None, &a, base());
        assert!(!status.is_participant);
        assert!(!status.can_check_in);
        assert_eq!(status.activity_status, ActivityStatus::Ongoing);
    }

    #[test]
    fn test_status_can_check_in_only_when_open_and_pending() {
        let a = activity(Some(base() + Duration::hours(1)));
        let mut p = joined(&a);

        assert!(check_in_status(Some(&p), &a, base()).can_check_in);
        assert!(!check_in_status(Some(&p), &a, base() - Duration::hours(1)).can_check_in);

        p.checked_in = true;
        p.checked_at = Some(base());
        let status = check_in_status(Some(&p), &a, base());
        assert!(status.checked_in);
        assert_eq!(status.checked_at, Some(base()));
        assert!(!status.can_check_in);
    }
}
