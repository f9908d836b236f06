//! Commit Graph Module
//!
//! Projects own branches, branches point at their head commit, and every
//! commit records its parent. This is the "git log" half of the service.
//! - `graph`: the service operations (create, lookup, log)
//! - `memory`: in-process store used in tests and when no database is configured
//! - `postgres`: the persistent store

pub mod graph;
pub mod memory;
pub mod postgres;

pub use graph::CommitGraph;
pub use memory::MemoryHistoryStore;
pub use postgres::PostgresHistoryStore;

use crate::connection::mask_connection_string;
use crate::error::AppError;
use crate::snapshot::{Diff, DiffEngine, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// A versioned schema
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Connection string of the database rollbacks are applied to
    #[serde(serialize_with = "serialize_masked_url")]
    pub target_database_url: Option<String>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn serialize_masked_url<S: Serializer>(url: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    match url {
        Some(url) => serializer.serialize_some(&mask_connection_string(url)),
        None => serializer.serialize_none(),
    }
}

/// Named line of history inside a project
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub head_commit_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable snapshot of the schema with its diff against the parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub id: String,
    pub project_id: Uuid,
    pub branch_id: Uuid,
    pub message: String,
    pub author: String,
    pub snapshot: Snapshot,
    pub diff: Diff,
    #[serde(alias = "prevCommitId")]
    pub parent_commit_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Log entry (commit without its snapshot)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub id: String,
    pub short_id: String,
    pub message: String,
    pub author: String,
    pub branch_id: Uuid,
    pub parent_commit_id: Option<String>,
    pub change_count: usize,
    pub table_count: usize,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Commit> for CommitSummary {
    fn from(commit: &Commit) -> Self {
        Self {
            id: commit.id.clone(),
            short_id: commit.id.chars().take(7).collect(),
            message: commit.message.clone(),
            author: commit.author.clone(),
            branch_id: commit.branch_id,
            parent_commit_id: commit.parent_commit_id.clone(),
            change_count: commit.diff.len(),
            table_count: commit.snapshot.table_count(),
            checksum: commit.snapshot.checksum(),
            created_at: commit.created_at,
        }
    }
}

/// Project with all of its branches
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWithBranches {
    #[serde(flatten)]
    pub project: Project,
    pub branches: Vec<Branch>,
}

/// Input for creating (or refreshing) a project
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub target_database_url: Option<String>,
    pub owner_id: String,
}

/// Input for recording a commit
#[derive(Debug, Clone)]
pub struct NewCommit {
    pub message: String,
    pub author: String,
    pub snapshot: Snapshot,
    /// Computed against the parent snapshot when absent
    pub diff: Option<Diff>,
    pub branch_name: Option<String>,
    pub parent_commit_id: Option<String>,
}

/// Persistence seam for the commit graph
///
/// `append_commit` is the only mutation of a branch head. Implementations run
/// the head read, the commit insert and the head advance as one unit per
/// branch, so concurrent commits on one branch never lose a head update.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn find_project(&self, name: &str) -> Result<Option<Project>, AppError>;

    /// Insert the project together with its `main` branch
    async fn insert_project(&self, project: NewProject) -> Result<Project, AppError>;

    /// Replace the description; the target URL only changes when supplied
    async fn update_project(
        &self,
        project_id: Uuid,
        description: Option<String>,
        target_database_url: Option<String>,
    ) -> Result<Project, AppError>;

    async fn list_branches(&self, project_id: Uuid) -> Result<Vec<Branch>, AppError>;

    async fn find_branch(&self, project_id: Uuid, name: &str) -> Result<Option<Branch>, AppError>;

    /// Resolve or create the branch, link the parent, insert, advance the head
    async fn append_commit(&self, project_id: Uuid, branch_name: &str, commit: NewCommit) -> Result<Commit, AppError>;

    async fn find_commit(&self, project_id: Uuid, id: &str) -> Result<Option<Commit>, AppError>;

    async fn find_commits_by_prefix(&self, project_id: Uuid, prefix: &str, limit: usize) -> Result<Vec<Commit>, AppError>;

    /// Newest first across all branches of the project
    async fn list_commits(&self, project_id: Uuid, limit: usize) -> Result<Vec<Commit>, AppError>;
}

/// Diff to store with a commit: the caller's, or one computed against the parent
pub(crate) fn finalize_diff(supplied: Option<Diff>, parent: Option<&Snapshot>, snapshot: &Snapshot) -> Diff {
    match supplied {
        Some(diff) => diff,
        None => match parent {
            Some(parent) => DiffEngine::diff(parent, snapshot),
            None => DiffEngine::diff(&Snapshot::empty(), snapshot),
        },
    }
}

/// Fresh commit identifier (lowercase hyphenated UUID v4)
pub(crate) fn new_commit_id() -> String {
    Uuid::new_v4().to_string()
}
