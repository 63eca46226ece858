use std::path::PathBuf;

use axum::{
    extract::{Path, State},
    response::Json,
};
use foreman_model::{RepoRef, RepoState};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::infra::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddRepoRequest {
    pub name: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkAddRequest {
    pub paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PatchStatusRequest {
    pub status: Option<String>,
}

/// Get all repository states
pub async fn list_repos_handler(
    State(state): State<AppState>,
) -> Json<Value> {
    Json(json!({ "repos": state.registry.snapshot_all() }))
}

/// Get one repository's state
pub async fn get_repo_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<RepoState>> {
    let snapshot = state
        .registry
        .snapshot(&name)
        .ok_or_else(|| AppError::not_found("Repo not found"))?;
    Ok(Json(snapshot.as_ref().clone()))
}

/// Register a new repository
pub async fn add_repo_handler(
    State(state): State<AppState>,
    Json(request): Json<AddRepoRequest>,
) -> AppResult<Json<Value>> {
    let path = request
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("path is required"))?;
    let path = PathBuf::from(path);
    let name = request
        .name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| {
            path.file_name().map(|n| n.to_string_lossy().into_owned())
        })
        .ok_or_else(|| AppError::bad_request("name is required"))?;

    info!(%name, path = %path.display(), "adding repo");
    let repo_state = state
        .registry
        .add_repo(RepoRef { name, path })
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "state": repo_state.as_ref(),
    })))
}

/// Remove a repository
pub async fn remove_repo_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<Value>> {
    state.registry.remove_repo(&name).await?;
    Ok(Json(json!({ "success": true })))
}

/// Add many repositories at once
pub async fn bulk_add_handler(
    State(state): State<AppState>,
    Json(request): Json<BulkAddRequest>,
) -> AppResult<Json<Value>> {
    let paths: Vec<PathBuf> =
        request.paths.into_iter().map(PathBuf::from).collect();
    let outcome = state.registry.bulk_add(paths).await;
    Ok(Json(json!({
        "added": outcome.added,
        "errors": outcome.errors,
    })))
}

/// Transition one work effort's status via a frontmatter edit. The
/// watcher observes the write and drives the refresh broadcast.
pub async fn patch_status_handler(
    State(state): State<AppState>,
    Path((name, we_id)): Path<(String, String)>,
    Json(request): Json<PatchStatusRequest>,
) -> AppResult<Json<Value>> {
    let requested = request
        .status
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("status is required"))?;

    let status = state
        .registry
        .patch_status(&name, &we_id, &requested)
        .await?;
    Ok(Json(json!({ "success": true, "status": status })))
}
