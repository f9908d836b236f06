//! Project route handlers

use crate::auth::Identity;
use crate::error::ApiResult;
use crate::history::{Branch, NewProject, ProjectWithBranches};
use crate::models::{validate_request, CreateProjectRequest, ProjectPayload, SuccessResponse};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use tracing::debug;

/// Create a project, or refresh the description of an existing one
pub async fn create_project(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<ProjectPayload>>)> {
    validate_request(&payload)?;
    debug!("Creating project: {}", payload.name);

    let project = state
        .graph
        .create_project(NewProject {
            name: payload.name,
            description: payload.description,
            target_database_url: payload.target_database_url,
            owner_id: identity.author().to_string(),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data("Project saved.", ProjectPayload { project })),
    ))
}

/// Project with its branches
pub async fn get_project(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ProjectWithBranches>> {
    Ok(Json(state.graph.get_project(&name).await?))
}

/// A single branch and its head
pub async fn get_branch(
    State(state): State<SharedState>,
    Path((name, branch)): Path<(String, String)>,
) -> ApiResult<Json<Branch>> {
    Ok(Json(state.graph.get_branch(&name, &branch).await?))
}
