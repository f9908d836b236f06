//! Error handling module
//!
//! Provides the unified error type for the versioning engine and its HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tokio_postgres::error::SqlState;
use tracing::error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Project '{0}' not found")]
    ProjectNotFound(String),

    #[error("Branch '{0}' not found")]
    BranchNotFound(String),

    #[error("Commit '{0}' not found")]
    CommitNotFound(String),

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Project '{0}' has no target database configured")]
    InvalidTargetConfiguration(String),

    #[error("Destructive operation aborted, target database unchanged: {0}")]
    TransactionFailure(#[source] Box<AppError>),

    #[error("Commit identifier '{prefix}' is ambiguous ({} matches)", .candidates.len())]
    AmbiguousIdentifier {
        prefix: String,
        candidates: Vec<String>,
    },

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Target connection failed: {0}")]
    Connection(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<String>>,
}

impl AppError {
    /// HTTP status and stable machine-readable code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::ProjectNotFound(_) => (StatusCode::NOT_FOUND, "PROJECT_NOT_FOUND"),
            AppError::BranchNotFound(_) => (StatusCode::NOT_FOUND, "BRANCH_NOT_FOUND"),
            AppError::CommitNotFound(_) => (StatusCode::NOT_FOUND, "COMMIT_NOT_FOUND"),
            AppError::MalformedSnapshot(_) => (StatusCode::UNPROCESSABLE_ENTITY, "MALFORMED_SNAPSHOT"),
            AppError::InvalidTargetConfiguration(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_TARGET_CONFIGURATION")
            }
            AppError::TransactionFailure(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TRANSACTION_FAILED"),
            AppError::AmbiguousIdentifier { .. } => (StatusCode::CONFLICT, "AMBIGUOUS_IDENTIFIER"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            AppError::Pool(_) => (StatusCode::SERVICE_UNAVAILABLE, "POOL_EXHAUSTED"),
            AppError::Connection(_) => (StatusCode::BAD_GATEWAY, "TARGET_CONNECTION_FAILED"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        }
    }
}

impl AppError {
    /// SQLSTATE of the underlying database error, looking through a failed rollback
    pub fn sql_state(&self) -> Option<&SqlState> {
        match self {
            AppError::Database(e) => e.code(),
            AppError::TransactionFailure(cause) => cause.sql_state(),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let (message, details, candidates) = match &self {
            AppError::Database(e) => {
                error!("Database error: {:?}", e);
                ("A database error occurred".to_string(), Some(e.to_string()), None)
            }
            AppError::Pool(e) => {
                error!("Pool error: {:?}", e);
                ("Database connection pool exhausted".to_string(), Some(e.to_string()), None)
            }
            AppError::TransactionFailure(cause) => {
                error!("Rollback transaction failed: {:?}", cause);
                let details = match self.sql_state() {
                    Some(state) => format!("{} (SQLSTATE {})", cause, state.code()),
                    None => cause.to_string(),
                };
                (
                    "Destructive operation aborted, target database unchanged".to_string(),
                    Some(details),
                    None,
                )
            }
            AppError::Connection(cause) => {
                error!("Target connection failed: {}", cause);
                ("Could not connect to the target database".to_string(), Some(cause.clone()), None)
            }
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                ("An internal error occurred".to_string(), Some(msg.clone()), None)
            }
            AppError::Config(msg) => {
                error!("Configuration error: {}", msg);
                ("A configuration error occurred".to_string(), Some(msg.clone()), None)
            }
            AppError::AmbiguousIdentifier { candidates, .. } => {
                (self.to_string(), None, Some(candidates.clone()))
            }
            _ => (self.to_string(), None, None),
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(code.to_string()),
            candidates,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}
