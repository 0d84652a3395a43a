//! Identity types for STRIDE entities

use chrono::{DateTime, Utc};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Common behaviour of the strongly-typed entity identifiers.
///
/// Every id wraps a UUID. New ids are UUIDv7 so they sort by creation time.
pub trait EntityIdType:
    Copy + Eq + Hash + Ord + fmt::Debug + fmt::Display + FromStr + Send + Sync + 'static
{
    /// Human-readable entity label used in error messages.
    const ENTITY_NAME: &'static str;

    /// Wrap an existing UUID.
    fn new(uuid: Uuid) -> Self;

    /// Borrow the underlying UUID.
    fn as_uuid(&self) -> Uuid;

    /// Generate a new timestamp-sortable id.
    fn now_v7() -> Self {
        Self::new(Uuid::now_v7())
    }

    /// The nil id, useful as a placeholder in tests.
    fn nil() -> Self {
        Self::new(Uuid::nil())
    }
}

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            const ENTITY_NAME: &'static str = $label;

            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_entity_id!(
    /// Learner identity, supplied by the external auth layer.
    UserId,
    "User"
);
define_entity_id!(
    /// Activity (event) a learner can join and check in to.
    ActivityId,
    "Activity"
);
define_entity_id!(CourseId, "Course");
define_entity_id!(
    /// Learning unit inside a course.
    ModuleId,
    "Module"
);
define_entity_id!(SkillId, "Skill");
define_entity_id!(LedgerEntryId, "LedgerEntry");
define_entity_id!(QuizAttemptId, "QuizAttempt");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_time_sortable() {
        let first = UserId::now_v7();
        let second = UserId::now_v7();
        assert!(first <= second);
    }

    #[test]
    fn test_id_display_parse_roundtrip() {
        let id = ModuleId::now_v7();
        let parsed: ModuleId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_id_parse_rejects_garbage() {
        assert!("not-a-uuid".parse::<ActivityId>().is_err());
    }

    #[test]
    fn test_id_serializes_as_bare_uuid() {
        let uuid = Uuid::now_v7();
        let json = serde_json::to_string(&SkillId::new(uuid)).unwrap();
        assert_eq!(json, format!("\"{}\"", uuid));
    }
}
