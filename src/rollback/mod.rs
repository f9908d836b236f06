//! Rollback Engine
//!
//! Reconstructs a target database from a stored snapshot.
//! - `plan`: pure SQL synthesis
//! - `engine`: transactional execution against the target

pub mod engine;
pub mod plan;

pub use engine::{RollbackEngine, RollbackReport};
pub use plan::RollbackOptions;
