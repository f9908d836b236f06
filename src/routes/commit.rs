//! Commit route handlers
//!
//! Committing, head lookup, id/prefix lookup, log and diff between commits.

use crate::auth::Identity;
use crate::error::ApiResult;
use crate::history::{Commit, NewCommit};
use crate::models::{
    validate_request, CommitCreatedPayload, CommitLogResponse, CreateCommitRequest, DiffQuery, DiffResponse,
    LatestCommitQuery, LatestCommitResponse, LogQuery, SuccessResponse,
};
use crate::snapshot::{DiffEngine, DiffSummary, Snapshot};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use tracing::debug;

/// Record a snapshot on a branch
pub async fn create_commit(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
    Json(payload): Json<CreateCommitRequest>,
) -> ApiResult<Json<SuccessResponse<CommitCreatedPayload>>> {
    validate_request(&payload)?;
    let snapshot = payload.snapshot.into_snapshot()?;

    let commit = state
        .graph
        .create_commit(
            &name,
            NewCommit {
                message: payload.message,
                author: identity.author().to_string(),
                snapshot,
                diff: payload.diff,
                branch_name: payload.branch_name,
                parent_commit_id: payload.parent_commit_id,
            },
        )
        .await?;

    Ok(Json(SuccessResponse::with_data(
        "Commit created.",
        CommitCreatedPayload {
            commit_id: commit.id.clone(),
            commit,
        },
    )))
}

/// Head commit of a branch (`main` unless `?branch=` is given)
pub async fn latest_commit(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Query(query): Query<LatestCommitQuery>,
) -> ApiResult<Json<LatestCommitResponse>> {
    let branch = query.branch.as_deref().filter(|b| !b.is_empty());
    let commit = state.graph.get_latest_commit(&name, branch).await?;
    Ok(Json(LatestCommitResponse { commit }))
}

/// Commit by full id or unique prefix
pub async fn get_commit(
    State(state): State<SharedState>,
    Path((name, commit_id)): Path<(String, String)>,
) -> ApiResult<Json<Commit>> {
    Ok(Json(state.graph.resolve_commit(&name, &commit_id).await?))
}

/// Newest commits first, across all branches
pub async fn commit_log(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<CommitLogResponse>> {
    validate_request(&query)?;
    let limit = query.limit.unwrap_or(state.default_log_limit);
    let commits = state.graph.get_commit_log(&name, Some(limit)).await?;
    Ok(Json(CommitLogResponse { commits }))
}

/// Structural diff between two commits; `from` defaults to the parent of `to`
pub async fn diff_commits(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Query(query): Query<DiffQuery>,
) -> ApiResult<Json<DiffResponse>> {
    validate_request(&query)?;
    let to = state.graph.resolve_commit(&name, &query.to).await?;

    let from_id = match query.from.as_deref().filter(|f| !f.is_empty()) {
        Some(id) => Some(id.to_string()),
        None => to.parent_commit_id.clone(),
    };
    let from = match &from_id {
        Some(id) => Some(state.graph.resolve_commit(&name, id).await?),
        None => None,
    };
    debug!("Diffing {} -> {}", from_id.as_deref().unwrap_or("(empty)"), to.id);

    let empty = Snapshot::empty();
    let base = from.as_ref().map_or(&empty, |c| &c.snapshot);
    let changes = DiffEngine::diff(base, &to.snapshot);

    Ok(Json(DiffResponse {
        from: from.map(|c| c.id),
        to: to.id,
        summary: DiffSummary::from_changes(&changes),
        changes,
    }))
}
