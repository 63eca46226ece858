use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use foreman_config::{Config, ConfigStore};
use foreman_core::counter::CounterService;
use foreman_core::events::EventBus;
use foreman_core::RepoRegistry;
use foreman_model::RepoRef;
use foreman_server::routes::create_api_router;
use foreman_server::websocket::ClientRegistry;
use foreman_server::AppState;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

// Code is used by test modules, but not in this scope
#[allow(unused)]
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub registry: Arc<RepoRegistry>,
    pub workspace: TempDir,
}

#[allow(unused)]
impl TestApp {
    /// Spin up a full app over a temp workspace. Each named repo gets
    /// its own directory under the workspace root, which also serves
    /// as the browse root.
    pub async fn spawn(repos: &[&str]) -> Self {
        let workspace = TempDir::new().unwrap();
        let repo_refs: Vec<RepoRef> = repos
            .iter()
            .map(|name| {
                let path = workspace.path().join(name);
                fs::create_dir_all(path.join("_work_efforts")).unwrap();
                RepoRef {
                    name: (*name).to_owned(),
                    path,
                }
            })
            .collect();

        let config = Config {
            repos: repo_refs,
            browse_root: workspace.path().to_path_buf(),
            ..Config::default()
        };
        let store = ConfigStore::from_config(
            workspace.path().join("config.json"),
            config,
        );
        store.save().unwrap();

        let registry = RepoRegistry::new(store, EventBus::new());
        registry.init().await.unwrap();

        let counters = Arc::new(
            CounterService::load(
                workspace.path().join("counter-state.json"),
            )
            .unwrap(),
        );

        let state = AppState::new(
            Arc::clone(&registry),
            counters,
            Arc::new(ClientRegistry::new()),
            workspace.path().to_path_buf(),
        );
        let router = create_api_router(state.clone());

        Self {
            router,
            state,
            registry,
            workspace,
        }
    }

    pub fn repo_path(&self, name: &str) -> PathBuf {
        self.workspace.path().join(name)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn patch(
        &self,
        uri: &str,
        body: Value,
    ) -> (StatusCode, Value) {
        self.request(Method::PATCH, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, None).await
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder
                    .header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).unwrap();

        let response =
            self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

/// Write one MCP work effort with optional tickets into a repo root.
#[allow(unused)]
pub fn seed_work_effort(
    repo_root: &Path,
    id: &str,
    title: &str,
    status: &str,
    tickets: &[(&str, &str)],
) {
    let dir = repo_root.join(format!("_work_efforts/{id}_fixture"));
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join(format!("{id}_index.md")),
        format!(
            "---\nid: {id}\ntitle: \"{title}\"\nstatus: {status}\ncreated: 2026-05-01T09:00:00Z\n---\n# {title}\n"
        ),
    )
    .unwrap();

    if !tickets.is_empty() {
        let tickets_dir = dir.join("tickets");
        fs::create_dir_all(&tickets_dir).unwrap();
        for (tkt_id, tkt_status) in tickets {
            fs::write(
                tickets_dir.join(format!("{tkt_id}_task.md")),
                format!(
                    "---\nid: {tkt_id}\nparent: {id}\ntitle: \"Task\"\nstatus: {tkt_status}\n---\n"
                ),
            )
            .unwrap();
        }
    }
}
