//! Core data model definitions shared across votepipe crates.
#![allow(missing_docs)]

pub mod choice;
pub mod error;
pub mod events;
pub mod ids;
pub mod snapshot;
pub mod submission;

pub use choice::Choice;
pub use error::{ModelError, Result, Result as ModelResult};
pub use events::ViewerEvent;
pub use ids::VoterId;
pub use snapshot::AggregateSnapshot;
pub use submission::{Submission, TallyRow};
