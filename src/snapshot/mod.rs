//! Schema Snapshot Module
//!
//! Point-in-time captures of a schema and the engine that compares them.
//! - `model`: snapshot, table and column definitions
//! - `ordered`: insertion-ordered name mapping used by the model
//! - `diff`: structural diff between two snapshots

pub mod diff;
pub mod model;
pub mod ordered;

pub use diff::{Change, Diff, DiffEngine, DiffSummary};
pub use model::{ColumnDef, Snapshot, TableDef};
#[cfg(test)]
pub use model::Row;
