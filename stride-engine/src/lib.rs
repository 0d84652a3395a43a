//! STRIDE Engine - Learner-Facing Operations
//!
//! [`LearningEngine`] turns learner actions into committed state: the
//! activity check-in gate, the module progression machine and the skill
//! profile reads. Rules come from `stride-core`; atomicity comes from the
//! [`LearningStore`] it is built on.

mod checkin;
mod clock;
mod error;
mod profile;
mod progression;

pub use checkin::CheckInResult;
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{EngineError, EngineResult};
pub use profile::{LedgerDiscrepancy, SkillProfileEntry};
pub use progression::{QuizSubmission, StageUpdate};

use std::sync::Arc;
use stride_storage::LearningStore;

/// Learner-facing service over a [`LearningStore`].
#[derive(Clone)]
pub struct LearningEngine {
    store: Arc<dyn LearningStore>,
    clock: Arc<dyn Clock>,
}

impl LearningEngine {
    /// Engine on the system clock.
    pub fn new(store: Arc<dyn LearningStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn LearningStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn LearningStore> {
        &self.store
    }

    fn now(&self) -> stride_core::Timestamp {
        self.clock.now()
    }
}

impl std::fmt::Debug for LearningEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningEngine").finish_non_exhaustive()
    }
}
