//! STRIDE Core - Entity Types and Pure Rules
//!
//! Data structures shared by every other crate, plus the side-effect free
//! rules of the engine: level classification, quiz scoring, check-in window
//! evaluation and module progression transitions. No I/O lives here.

mod award;
mod checkin;
mod entities;
mod enums;
mod error;
mod identity;
mod level;
mod progression;
mod quiz;

pub use award::*;
pub use checkin::*;
pub use entities::*;
pub use enums::*;
pub use error::*;
pub use identity::*;
pub use level::*;
pub use progression::*;
pub use quiz::*;
