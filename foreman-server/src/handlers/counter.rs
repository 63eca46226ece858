use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::Utc;
use foreman_core::counter::{migrate, validate, ValidationReport};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::infra::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

/// Stamp a payload with the response timestamp.
fn stamped(payload: Value) -> Value {
    let mut body = json!({ "timestamp": Utc::now() });
    if let (Some(obj), Some(extra)) =
        (body.as_object_mut(), payload.as_object())
    {
        for (key, value) in extra {
            obj.insert(key.clone(), value.clone());
        }
    }
    body
}

/// Current counter values and bookkeeping.
pub async fn counter_stats_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Value>> {
    let stats = state.counters.statistics().await;
    Ok(Json(stamped(serde_json::to_value(stats).map_err(
        |err| AppError::internal(err.to_string()),
    )?)))
}

/// Recent audit entries, newest last.
pub async fn counter_audit_handler(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<Value>> {
    let entries = state
        .counters
        .audit_log(query.limit.unwrap_or(100))
        .await;
    Ok(Json(stamped(json!({ "entries": entries }))))
}

/// Run all validation checks against the filesystem.
pub async fn counter_validate_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Value>> {
    let repos = state.registry.config_snapshot().await.repos;
    let report = validate::validate(&state.counters, &repos).await?;
    Ok(Json(serde_json::to_value(report).map_err(|err| {
        AppError::internal(err.to_string())
    })?))
}

/// Diff persisted counters against the filesystem.
pub async fn counter_migrate_report_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Value>> {
    let repos = state.registry.config_snapshot().await.repos;
    let report = migrate::report(&state.counters, &repos).await;
    Ok(Json(stamped(serde_json::to_value(report).map_err(
        |err| AppError::internal(err.to_string()),
    )?)))
}

/// Proposed migration writes, without executing them.
pub async fn counter_migrate_preview_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Value>> {
    let repos = state.registry.config_snapshot().await.repos;
    let proposed = migrate::preview(&state.counters, &repos).await;
    Ok(Json(stamped(json!({ "proposed": proposed }))))
}

/// Initialize every counter from a filesystem scan.
pub async fn counter_migrate_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Value>> {
    let repos = state.registry.config_snapshot().await.repos;
    info!("running scan-based counter migration");
    let result = migrate::migrate(&state.counters, &repos).await?;
    Ok(Json(stamped(serde_json::to_value(result).map_err(
        |err| AppError::internal(err.to_string()),
    )?)))
}

/// Apply a validation report's auto-applicable suggestions.
pub async fn counter_repair_handler(
    State(state): State<AppState>,
    Json(report): Json<ValidationReport>,
) -> AppResult<Json<Value>> {
    let result =
        validate::auto_repair(&state.counters, &report).await?;
    Ok(Json(stamped(serde_json::to_value(result).map_err(
        |err| AppError::internal(err.to_string()),
    )?)))
}
