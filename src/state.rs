//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::config::Settings;
use crate::history::{CommitGraph, HistoryStore};
use crate::rollback::{RollbackEngine, RollbackOptions};
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Projects, branches and commits
    pub graph: CommitGraph,

    /// Rebuilds target databases from stored snapshots
    pub rollback: RollbackEngine,

    /// Secret used to verify bearer tokens
    pub jwt_secret: String,

    /// Log length when a request gives no `limit`
    pub default_log_limit: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn HistoryStore>, settings: &Settings, jwt_secret: String) -> Self {
        let options = RollbackOptions {
            schema: settings.rollback.schema.clone(),
            reserved_table: settings.rollback.reserved_table.clone(),
            full_fidelity: settings.rollback.full_fidelity,
            statement_timeout_ms: settings.rollback.statement_timeout_ms,
        };

        Self {
            graph: CommitGraph::new(store),
            rollback: RollbackEngine::new(options),
            jwt_secret,
            default_log_limit: settings.history.default_log_limit,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
