//! PostgreSQL history store
//!
//! Snapshots and diffs are stored as JSON text so table and column order
//! survive the round trip. `append_commit` runs in one transaction holding the
//! branch row lock, which serializes commits per branch.

use super::{finalize_diff, new_commit_id, Branch, Commit, HistoryStore, NewCommit, NewProject, Project};
use crate::db::queries;
use crate::error::AppError;
use crate::history::graph::DEFAULT_BRANCH;
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use tracing::debug;
use uuid::Uuid;

/// History store backed by the metadata database
pub struct PostgresHistoryStore {
    pool: Pool,
}

impl PostgresHistoryStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn project_from_row(row: &Row) -> Project {
    Project {
        id: row.get(0),
        name: row.get(1),
        description: row.get(2),
        target_database_url: row.get(3),
        owner_id: row.get(4),
        created_at: row.get(5),
        updated_at: row.get(6),
    }
}

fn branch_from_row(row: &Row) -> Branch {
    Branch {
        id: row.get(0),
        project_id: row.get(1),
        name: row.get(2),
        head_commit_id: row.get(3),
        created_at: row.get(4),
    }
}

fn commit_from_row(row: &Row) -> Result<Commit, AppError> {
    let id: String = row.get(0);
    let snapshot = serde_json::from_str(row.get::<_, &str>(5))
        .map_err(|e| AppError::MalformedSnapshot(format!("stored snapshot of {}: {}", id, e)))?;
    let diff = serde_json::from_str(row.get::<_, &str>(6))
        .map_err(|e| AppError::Internal(format!("stored diff of {}: {}", id, e)))?;

    Ok(Commit {
        id,
        project_id: row.get(1),
        branch_id: row.get(2),
        message: row.get(3),
        author: row.get(4),
        snapshot,
        diff,
        parent_commit_id: row.get(7),
        created_at: row.get(8),
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| AppError::Internal(format!("Serialization error: {}", e)))
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn find_project(&self, name: &str) -> Result<Option<Project>, AppError> {
        let client = self.pool.get().await?;
        let row = client.query_opt(&queries::select_project_by_name(), &[&name]).await?;
        Ok(row.as_ref().map(project_from_row))
    }

    async fn insert_project(&self, project: NewProject) -> Result<Project, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_one(
                &queries::insert_project(),
                &[
                    &Uuid::new_v4(),
                    &project.name,
                    &project.description,
                    &project.target_database_url,
                    &project.owner_id,
                    &chrono::Utc::now(),
                ],
            )
            .await
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    AppError::Conflict(format!("Project '{}' already exists", project.name))
                } else {
                    AppError::Database(e)
                }
            })?;
        let created = project_from_row(&row);

        tx.execute(queries::INSERT_BRANCH, &[&Uuid::new_v4(), &created.id, &DEFAULT_BRANCH])
            .await?;
        tx.commit().await?;

        Ok(created)
    }

    async fn update_project(
        &self,
        project_id: Uuid,
        description: Option<String>,
        target_database_url: Option<String>,
    ) -> Result<Project, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(&queries::update_project(), &[&project_id, &description, &target_database_url])
            .await?
            .ok_or_else(|| AppError::ProjectNotFound(project_id.to_string()))?;
        Ok(project_from_row(&row))
    }

    async fn list_branches(&self, project_id: Uuid) -> Result<Vec<Branch>, AppError> {
        let client = self.pool.get().await?;
        let rows = client.query(&queries::select_branches(), &[&project_id]).await?;
        Ok(rows.iter().map(branch_from_row).collect())
    }

    async fn find_branch(&self, project_id: Uuid, name: &str) -> Result<Option<Branch>, AppError> {
        let client = self.pool.get().await?;
        let row = client.query_opt(&queries::select_branch(), &[&project_id, &name]).await?;
        Ok(row.as_ref().map(branch_from_row))
    }

    async fn append_commit(&self, project_id: Uuid, branch_name: &str, commit: NewCommit) -> Result<Commit, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let lock_branch = queries::select_branch_for_update();

        let branch = match tx.query_opt(&lock_branch, &[&project_id, &branch_name]).await? {
            Some(row) => branch_from_row(&row),
            None => {
                debug!("Creating branch '{}' for project {}", branch_name, project_id);
                tx.execute(queries::INSERT_BRANCH, &[&Uuid::new_v4(), &project_id, &branch_name])
                    .await?;
                branch_from_row(&tx.query_one(&lock_branch, &[&project_id, &branch_name]).await?)
            }
        };

        let parent_id = match commit.parent_commit_id {
            Some(explicit) => Some(explicit),
            None => branch.head_commit_id.clone(),
        };

        let parent_snapshot: Option<Snapshot> = match &parent_id {
            Some(id) => match tx.query_opt(&queries::select_commit(), &[&project_id, id]).await? {
                Some(row) => Some(commit_from_row(&row)?.snapshot),
                None => return Err(AppError::CommitNotFound(id.clone())),
            },
            None => None,
        };
        let diff = finalize_diff(commit.diff, parent_snapshot.as_ref(), &commit.snapshot);

        let row = tx
            .query_one(
                &queries::insert_commit(),
                &[
                    &new_commit_id(),
                    &project_id,
                    &branch.id,
                    &commit.message,
                    &commit.author,
                    &to_json(&commit.snapshot)?,
                    &to_json(&diff)?,
                    &parent_id,
                ],
            )
            .await?;
        let created = commit_from_row(&row)?;

        tx.execute(queries::ADVANCE_HEAD, &[&branch.id, &created.id]).await?;
        tx.commit().await?;

        Ok(created)
    }

    async fn find_commit(&self, project_id: Uuid, id: &str) -> Result<Option<Commit>, AppError> {
        let client = self.pool.get().await?;
        let row = client.query_opt(&queries::select_commit(), &[&project_id, &id]).await?;
        row.as_ref().map(commit_from_row).transpose()
    }

    async fn find_commits_by_prefix(&self, project_id: Uuid, prefix: &str, limit: usize) -> Result<Vec<Commit>, AppError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(&queries::select_commits_by_prefix(), &[&project_id, &prefix, &(limit as i64)])
            .await?;
        rows.iter().map(commit_from_row).collect()
    }

    async fn list_commits(&self, project_id: Uuid, limit: usize) -> Result<Vec<Commit>, AppError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(&queries::select_commit_log(), &[&project_id, &(limit as i64)])
            .await?;
        rows.iter().map(commit_from_row).collect()
    }
}
