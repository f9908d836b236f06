//! Rollback execution
//!
//! Applies a [`RollbackPlan`] to a target database inside one transaction.
//! Either every statement succeeds and the transaction commits, or it is
//! rolled back and the target is left exactly as it was.

use super::plan::{RollbackOptions, RollbackPlan};
use crate::connection::connect_target;
use crate::db::queries::LIST_USER_TABLES;
use crate::error::AppError;
use crate::history::{Commit, Project};
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info};

/// The operations rollback needs from an open transaction
#[async_trait]
pub trait TargetTransaction: Send {
    /// Base tables currently in `schema`
    async fn user_tables(&mut self, schema: &str) -> Result<Vec<String>, AppError>;

    /// Run one statement, returning the affected row count
    async fn execute(&mut self, sql: &str) -> Result<u64, AppError>;

    async fn commit(self) -> Result<(), AppError>
    where
        Self: Sized;

    async fn rollback(self) -> Result<(), AppError>
    where
        Self: Sized;
}

#[async_trait]
impl<'a> TargetTransaction for tokio_postgres::Transaction<'a> {
    async fn user_tables(&mut self, schema: &str) -> Result<Vec<String>, AppError> {
        let rows = tokio_postgres::Transaction::query(&*self, LIST_USER_TABLES, &[&schema]).await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, AppError> {
        Ok(tokio_postgres::Transaction::execute(&*self, sql, &[]).await?)
    }

    async fn commit(self) -> Result<(), AppError> {
        Ok(tokio_postgres::Transaction::commit(self).await?)
    }

    async fn rollback(self) -> Result<(), AppError> {
        Ok(tokio_postgres::Transaction::rollback(self).await?)
    }
}

/// Outcome of a completed rollback
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    pub commit_id: String,
    pub schema: String,
    pub dropped_tables: Vec<String>,
    pub created_tables: Vec<String>,
    pub skipped_tables: Vec<String>,
    pub inserted_rows: u64,
    pub statements: usize,
    pub duration_ms: u64,
}

/// Rebuilds a project's target database from a stored snapshot
#[derive(Debug, Clone, Default)]
pub struct RollbackEngine {
    options: RollbackOptions,
}

impl RollbackEngine {
    pub fn new(options: RollbackOptions) -> Self {
        Self { options }
    }

    /// Replace the target schema of `project` with the snapshot of `commit`
    pub async fn rollback(&self, project: &Project, commit: &Commit) -> Result<RollbackReport, AppError> {
        let url = project
            .target_database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| AppError::InvalidTargetConfiguration(project.name.clone()))?;
        commit.snapshot.validate()?;

        let started = Instant::now();
        let mut target = connect_target(url).await?;
        let tx = target
            .client
            .transaction()
            .await
            .map_err(|e| AppError::TransactionFailure(Box::new(AppError::Database(e))))?;

        let mut report = self.apply_snapshot(tx, &commit.snapshot).await?;
        report.commit_id = commit.id.clone();
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "Rolled back '{}' to {}: dropped {}, created {}, {} rows in {}ms",
            project.name,
            commit.id,
            report.dropped_tables.len(),
            report.created_tables.len(),
            report.inserted_rows,
            report.duration_ms
        );
        Ok(report)
    }

    /// Run the plan for `snapshot` on `tx`, committing only if every statement succeeds
    pub async fn apply_snapshot<T: TargetTransaction>(&self, mut tx: T, snapshot: &Snapshot) -> Result<RollbackReport, AppError> {
        match self.execute_plan(&mut tx, snapshot).await {
            Ok(report) => {
                tx.commit()
                    .await
                    .map_err(|e| AppError::TransactionFailure(Box::new(e)))?;
                Ok(report)
            }
            Err(e) => {
                error!("Rollback statement failed, rolling back: {}", e);
                if let Err(rollback_err) = tx.rollback().await {
                    error!("Transaction rollback also failed: {}", rollback_err);
                }
                Err(AppError::TransactionFailure(Box::new(e)))
            }
        }
    }

    async fn execute_plan<T: TargetTransaction>(&self, tx: &mut T, snapshot: &Snapshot) -> Result<RollbackReport, AppError> {
        let existing = tx.user_tables(&self.options.schema).await?;
        let plan = RollbackPlan::build(&existing, snapshot, &self.options);
        debug!(
            "Rollback plan: {} drops, {} creates, {} inserts",
            plan.drops.len(),
            plan.creates.len(),
            plan.inserts.len()
        );

        for sql in &plan.setup {
            tx.execute(sql).await?;
        }
        for statement in plan.drops.iter().chain(&plan.creates) {
            tx.execute(&statement.sql).await?;
        }
        let mut inserted_rows = 0;
        for statement in &plan.inserts {
            inserted_rows += tx.execute(&statement.sql).await?;
        }

        Ok(RollbackReport {
            schema: self.options.schema.clone(),
            statements: plan.statements().count(),
            dropped_tables: plan.drops.into_iter().map(|s| s.table).collect(),
            created_tables: plan.creates.into_iter().map(|s| s.table).collect(),
            skipped_tables: plan.skipped_tables,
            inserted_rows,
            ..Default::default()
        })
    }
}
