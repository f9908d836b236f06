//! Request and response DTOs
//!
//! Contains the request/response structures used by the HTTP API.

use crate::error::{validation_error, AppError};
use crate::history::{Commit, CommitSummary, Project};
use crate::rollback::RollbackReport;
use crate::snapshot::{Change, Diff, DiffSummary, Snapshot};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Project names travel in URL paths
static PROJECT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("project name pattern is valid"));

/// Generic success response
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Request to create or refresh a project
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 100, message = "Project name must be between 1 and 100 characters"))]
    #[validate(custom(function = "validate_project_name"))]
    pub name: String,
    pub description: Option<String>,
    #[serde(alias = "targetDbUrl")]
    #[validate(custom(function = "validate_target_url"))]
    pub target_database_url: Option<String>,
}

/// Request to record a commit
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommitRequest {
    #[validate(length(min = 1, message = "Commit message is required"))]
    pub message: String,
    pub snapshot: SnapshotPayload,
    pub diff: Option<Diff>,
    pub branch_name: Option<String>,
    #[serde(alias = "prevCommitId")]
    pub parent_commit_id: Option<String>,
}

/// Snapshot as sent by a client
///
/// The typed form keeps table and column order. Anything that fails to parse
/// is kept as raw JSON so the error can name what is wrong with it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SnapshotPayload {
    Parsed(Snapshot),
    Unparsed(serde_json::Value),
}

impl SnapshotPayload {
    pub fn into_snapshot(self) -> Result<Snapshot, AppError> {
        match self {
            SnapshotPayload::Parsed(snapshot) => {
                snapshot.validate()?;
                Ok(snapshot)
            }
            // Only duplicate names parse as a `Value` but not as a `Snapshot`
            SnapshotPayload::Unparsed(value) => Err(Snapshot::from_value(value)
                .err()
                .unwrap_or_else(|| AppError::MalformedSnapshot("duplicate table or column name".to_string()))),
        }
    }
}

/// Request to rebuild the target database from a commit
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRequest {
    #[validate(length(min = 1, message = "Commit ID is required"))]
    pub commit_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LatestCommitQuery {
    pub branch: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LogQuery {
    #[validate(range(min = 1, max = 1000, message = "limit must be between 1 and 1000"))]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DiffQuery {
    /// Defaults to the parent of `to`
    pub from: Option<String>,
    #[validate(length(min = 1, message = "`to` commit is required"))]
    pub to: String,
}

#[derive(Serialize)]
pub struct ProjectPayload {
    pub project: Project,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitCreatedPayload {
    pub commit_id: String,
    pub commit: Commit,
}

#[derive(Serialize)]
pub struct LatestCommitResponse {
    pub commit: Option<Commit>,
}

#[derive(Serialize)]
pub struct CommitLogResponse {
    pub commits: Vec<CommitSummary>,
}

#[derive(Serialize)]
pub struct DiffResponse {
    pub from: Option<String>,
    pub to: String,
    pub changes: Vec<Change>,
    pub summary: DiffSummary,
}

#[derive(Serialize)]
pub struct RollbackPayload {
    pub report: RollbackReport,
}

/// Run derive validations, mapping failures to a 400
pub fn validate_request<T: Validate>(payload: &T) -> Result<(), AppError> {
    payload.validate().map_err(|e| validation_error(e.to_string()))
}

fn validate_project_name(name: &str) -> Result<(), validator::ValidationError> {
    if !PROJECT_NAME.is_match(name) {
        let mut err = validator::ValidationError::new("invalid_project_name");
        err.message = Some("Project name may contain letters, digits, '.', '_' and '-' and must start with a letter or digit".into());
        return Err(err);
    }
    Ok(())
}

fn validate_target_url(url: &str) -> Result<(), validator::ValidationError> {
    crate::connection::ConnectionParams::from_connection_string(url)
        .map(|_| ())
        .map_err(|e| {
            let mut err = validator::ValidationError::new("invalid_target_url");
            err.message = Some(e.to_string().into());
            err
        })
}
