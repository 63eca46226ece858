use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{
    browse::browse_handler,
    counter::{
        counter_audit_handler, counter_migrate_handler,
        counter_migrate_preview_handler, counter_migrate_report_handler,
        counter_repair_handler, counter_stats_handler,
        counter_validate_handler,
    },
    health::health_handler,
    repos::{
        add_repo_handler, bulk_add_handler, get_repo_handler,
        list_repos_handler, patch_status_handler, remove_repo_handler,
    },
};
use crate::websocket::websocket_handler;
use crate::AppState;

/// Create the API router with all endpoints
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route(
            "/api/repos",
            get(list_repos_handler).post(add_repo_handler),
        )
        .route("/api/repos/bulk", post(bulk_add_handler))
        .route(
            "/api/repos/{name}",
            get(get_repo_handler).delete(remove_repo_handler),
        )
        .route(
            "/api/repos/{name}/work-efforts/{weId}/status",
            patch(patch_status_handler),
        )
        .route("/api/browse", get(browse_handler))
        .route("/api/counter/stats", get(counter_stats_handler))
        .route("/api/counter/audit", get(counter_audit_handler))
        .route("/api/counter/validate", get(counter_validate_handler))
        .route("/api/counter/migrate", post(counter_migrate_handler))
        .route(
            "/api/counter/migrate/report",
            get(counter_migrate_report_handler),
        )
        .route(
            "/api/counter/migrate/preview",
            post(counter_migrate_preview_handler),
        )
        .route("/api/counter/repair", post(counter_repair_handler))
        .route("/ws", axum::routing::any(websocket_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
