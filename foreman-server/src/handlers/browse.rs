use std::fs;
use std::path::{Path, PathBuf};

use axum::{
    extract::{Query, State},
    response::Json,
};
use foreman_core::scan::parser::work_efforts_dir;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::infra::app_state::AppState;

static WE_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^WE-\d{6}-[a-z0-9]{4}_.+").unwrap());

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_directory: bool,
    pub has_work_efforts: bool,
    pub work_effort_count: usize,
    pub is_added: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseResponse {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<PathBuf>,
    pub can_go_up: bool,
    pub items: Vec<BrowseEntry>,
}

/// Directory enumeration for the add-repo picker.
///
/// Requests are confined to the configured browse root; anything that
/// resolves outside it is rejected rather than listed.
pub async fn browse_handler(
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
) -> AppResult<Json<BrowseResponse>> {
    let root = state
        .browse_root
        .canonicalize()
        .map_err(|err| AppError::internal(err.to_string()))?;

    let requested = match &query.path {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => root.clone(),
    };
    let resolved = requested.canonicalize().map_err(|_| {
        AppError::bad_request(format!(
            "path does not exist: {}",
            requested.display()
        ))
    })?;
    if !resolved.starts_with(&root) {
        return Err(AppError::bad_request(
            "path is outside the browse root",
        ));
    }
    if !resolved.is_dir() {
        return Err(AppError::bad_request("path is not a directory"));
    }

    let configured = state.registry.config_snapshot().await;
    let added_paths: Vec<PathBuf> = configured
        .repos
        .iter()
        .filter_map(|r| r.path.canonicalize().ok())
        .collect();

    let mut items = Vec::new();
    let entries = fs::read_dir(&resolved)
        .map_err(|err| AppError::internal(err.to_string()))?;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name == "node_modules" {
            continue;
        }
        let path = entry.path();
        let is_directory = path.is_dir();
        let work_effort_count = if is_directory {
            count_work_efforts(&path)
        } else {
            0
        };
        let is_added = is_directory
            && path
                .canonicalize()
                .is_ok_and(|p| added_paths.contains(&p));

        items.push(BrowseEntry {
            name,
            has_work_efforts: work_effort_count > 0,
            work_effort_count,
            is_added,
            is_directory,
            path,
        });
    }

    // Work-efforts-bearing entries first, then alphabetical.
    items.sort_by(|a, b| {
        b.has_work_efforts
            .cmp(&a.has_work_efforts)
            .then_with(|| a.name.cmp(&b.name))
    });

    let parent = resolved
        .parent()
        .filter(|p| p.starts_with(&root))
        .map(Path::to_path_buf);

    Ok(Json(BrowseResponse {
        can_go_up: parent.is_some(),
        parent,
        path: resolved,
        items,
    }))
}

/// Recognized work effort children of a candidate repo directory.
fn count_work_efforts(candidate: &Path) -> usize {
    let Some(root) = work_efforts_dir(candidate) else {
        return 0;
    };
    let Ok(entries) = fs::read_dir(&root) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| {
            e.path().is_dir()
                && WE_DIR_RE
                    .is_match(&e.file_name().to_string_lossy())
        })
        .count()
}
