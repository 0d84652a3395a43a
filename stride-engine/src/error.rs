//! Engine error taxonomy
//!
//! Business-rule refusals carry a reason the caller can show. Storage and
//! other unexpected failures collapse into `Internal` after being logged, so
//! no backend detail leaks past the engine.

use stride_core::{
    CheckInRefusal, EntityIdType, ProgressionError, StrideError, Timestamp, ValidationError,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidState(String),

    /// The action already happened. `checked_at` is set for check-ins.
    #[error("{message}")]
    Conflict {
        message: String,
        checked_at: Option<Timestamp>,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Internal error")]
    Internal,
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn not_found<T: EntityIdType>(id: T) -> Self {
        Self::NotFound {
            entity: T::ENTITY_NAME,
            id: id.as_uuid(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            checked_at: None,
        }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::NotFound { .. } => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidState(_) => "invalid_state",
            Self::Conflict { .. } => "conflict",
            Self::Validation(_) => "validation",
            Self::Internal => "internal",
        }
    }
}

impl From<StrideError> for EngineError {
    fn from(err: StrideError) -> Self {
        match err {
            StrideError::Validation(v) => Self::Validation(v),
            other => {
                tracing::error!(error = %other, "engine operation failed");
                Self::Internal
            }
        }
    }
}

impl From<CheckInRefusal> for EngineError {
    fn from(refusal: CheckInRefusal) -> Self {
        match refusal {
            CheckInRefusal::NotParticipant => Self::Forbidden(refusal.to_string()),
            CheckInRefusal::NotStarted | CheckInRefusal::AlreadyEnded => {
                Self::InvalidState(refusal.to_string())
            }
            CheckInRefusal::AlreadyCheckedIn { checked_at } => Self::Conflict {
                message: refusal.to_string(),
                checked_at: Some(checked_at),
            },
        }
    }
}

impl From<ProgressionError> for EngineError {
    fn from(err: ProgressionError) -> Self {
        match err {
            ProgressionError::AlreadyCompleted => Self::conflict(err.to_string()),
            ProgressionError::InvalidState(violation) => Self::InvalidState(violation.to_string()),
            ProgressionError::Validation(v) => Self::Validation(v),
        }
    }
}
