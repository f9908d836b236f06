//! Rollback route handler

use crate::auth::Identity;
use crate::error::ApiResult;
use crate::models::{validate_request, RollbackPayload, RollbackRequest, SuccessResponse};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, State},
    Json,
};
use tracing::warn;

/// Replace the project's target schema with the snapshot of a commit
pub async fn rollback(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
    Json(payload): Json<RollbackRequest>,
) -> ApiResult<Json<SuccessResponse<RollbackPayload>>> {
    validate_request(&payload)?;

    let project = state.graph.require_project(&name).await?;
    let commit = state.graph.resolve_commit(&name, &payload.commit_id).await?;
    warn!(
        "{} is rolling back '{}' to {} (destructive)",
        identity.author(),
        project.name,
        commit.id
    );

    let report = state.rollback.rollback(&project, &commit).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Rolled back to {}.", commit.id),
        RollbackPayload { report },
    )))
}
