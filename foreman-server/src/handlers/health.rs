use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use crate::infra::app_state::AppState;

/// Liveness plus a coarse view of what the server is tracking.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime": state.uptime_secs(),
        "repos": state.registry.repo_names(),
        "clients": state.clients.count(),
    }))
}
