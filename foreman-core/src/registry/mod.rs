//! Authoritative owner of per-repository state.
//!
//! The registry holds the configured repo set, the latest parsed
//! snapshot for each repo, and the watch subscriptions that drive
//! refreshes. It is the single writer: every mutating operation is
//! serialized through the config lock, and readers only ever see
//! immutable `Arc` snapshots swapped in whole.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use foreman_config::{Config, ConfigStore};
use foreman_model::{
    DomainEvent, RepoChangeAction, RepoRef, RepoState, ServerFrame,
    WorkEffortStatus,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::spawn_blocking;
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, Result};
use crate::events::{detect_changes, EventBus};
use crate::scan::parser::{parse_repo, work_efforts_dir};
use crate::watch::{WatchConfig, WatchSignal, WatcherSet};

/// First `status:` line inside a frontmatter block.
static STATUS_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^status:[^\r\n]*$").unwrap());

/// Outcome of a bulk add: per-path transactional.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkAddOutcome {
    pub added: Vec<RepoRef>,
    pub errors: Vec<BulkAddError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkAddError {
    pub path: PathBuf,
    pub error: String,
}

/// Owner of `Map<repoName, RepoState>` plus repo lifecycle.
pub struct RepoRegistry {
    states: DashMap<String, Arc<RepoState>>,
    store: Mutex<ConfigStore>,
    watchers: WatcherSet,
    bus: EventBus,
    frames: broadcast::Sender<ServerFrame>,
    signals: Mutex<Option<mpsc::Receiver<WatchSignal>>>,
}

impl std::fmt::Debug for RepoRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoRegistry")
            .field("repo_count", &self.states.len())
            .field("frame_receivers", &self.frames.receiver_count())
            .finish()
    }
}

impl RepoRegistry {
    pub fn new(store: ConfigStore, bus: EventBus) -> Arc<Self> {
        let watch_config = WatchConfig::from_millis(
            store.config().debounce_ms,
            store.config().throttle_ms,
        );
        let (signal_tx, signal_rx) = mpsc::channel(256);
        let (frame_tx, _) = broadcast::channel(1024);

        Arc::new(Self {
            states: DashMap::new(),
            store: Mutex::new(store),
            watchers: WatcherSet::new(watch_config, signal_tx),
            bus,
            frames: frame_tx,
            signals: Mutex::new(Some(signal_rx)),
        })
    }

    /// Parse every configured repo, attach watchers, and start the
    /// signal pump. The initial parse is the baseline: no creation
    /// events are replayed for pre-existing records.
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        let repos: Vec<RepoRef> =
            self.store.lock().await.config().repos.clone();

        for repo in repos {
            let state = parse_into_state(repo.path.clone()).await;
            info!(
                repo = %repo.name,
                work_efforts = state.stats.total,
                error = ?state.error,
                "initial parse"
            );
            self.states.insert(repo.name.clone(), Arc::new(state));

            if let Err(err) =
                self.watchers.watch_repo(&repo.name, &repo.path).await
            {
                warn!(repo = %repo.name, %err, "failed to attach watcher");
            }
        }

        let rx = self
            .signals
            .lock()
            .await
            .take()
            .ok_or_else(|| {
                CoreError::Internal("registry already initialized".into())
            })?;
        tokio::spawn(run_signal_pump(Arc::downgrade(self), rx));
        Ok(())
    }

    /// Validate and register a new repo. Configuration is persisted to
    /// disk before any in-memory state changes.
    pub async fn add_repo(&self, repo: RepoRef) -> Result<Arc<RepoState>> {
        let mut store = self.store.lock().await;

        if !repo.path.is_dir() {
            return Err(CoreError::Internal(format!(
                "path does not exist: {}",
                repo.path.display()
            )));
        }
        if work_efforts_dir(&repo.path).is_none() {
            return Err(CoreError::Internal(format!(
                "no work-efforts directory under {}",
                repo.path.display()
            )));
        }
        store.add_repo(repo.clone())?;

        let state =
            Arc::new(parse_into_state(repo.path.clone()).await);
        self.states.insert(repo.name.clone(), Arc::clone(&state));

        if let Err(err) =
            self.watchers.watch_repo(&repo.name, &repo.path).await
        {
            warn!(repo = %repo.name, %err, "failed to attach watcher");
        }

        self.bus.emit_domain(&DomainEvent::RepoAdded {
            repo: repo.name.clone(),
        });
        let _ = self.frames.send(ServerFrame::RepoChange {
            action: RepoChangeAction::Added,
            repo: Some(repo.name.clone()),
            repos: None,
        });
        let _ = self.frames.send(ServerFrame::update(&repo.name, &state));

        Ok(state)
    }

    /// Detach the watcher, drop state, persist configuration.
    pub async fn remove_repo(&self, name: &str) -> Result<()> {
        let mut store = self.store.lock().await;
        if !store.config().has_repo(name) {
            return Err(CoreError::RepoNotFound(name.to_owned()));
        }
        store.remove_repo(name)?;

        self.watchers.unwatch_repo(name).await;
        self.states.remove(name);

        self.bus.emit_domain(&DomainEvent::RepoRemoved {
            repo: name.to_owned(),
        });
        let _ = self.frames.send(ServerFrame::RepoChange {
            action: RepoChangeAction::Removed,
            repo: Some(name.to_owned()),
            repos: None,
        });
        Ok(())
    }

    /// Add many repos at once. Each path is validated and persisted
    /// independently; one bad path does not poison the batch. Names
    /// derive from path basenames, and collisions are rejected rather
    /// than silently suffixed.
    pub async fn bulk_add(&self, paths: Vec<PathBuf>) -> BulkAddOutcome {
        let mut store = self.store.lock().await;
        let mut outcome = BulkAddOutcome::default();

        for path in paths {
            let Some(name) = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
            else {
                outcome.errors.push(BulkAddError {
                    path,
                    error: "path has no basename".to_owned(),
                });
                continue;
            };

            if !path.is_dir() {
                outcome.errors.push(BulkAddError {
                    path,
                    error: "path does not exist".to_owned(),
                });
                continue;
            }
            if work_efforts_dir(&path).is_none() {
                outcome.errors.push(BulkAddError {
                    path,
                    error: "no work-efforts directory".to_owned(),
                });
                continue;
            }
            if store.config().has_repo(&name) {
                outcome.errors.push(BulkAddError {
                    path,
                    error: format!("repo name already in use: {name}"),
                });
                continue;
            }

            let repo = RepoRef {
                name: name.clone(),
                path: path.clone(),
            };
            if let Err(err) = store.add_repo(repo.clone()) {
                outcome.errors.push(BulkAddError {
                    path,
                    error: err.to_string(),
                });
                continue;
            }

            let state = Arc::new(parse_into_state(path.clone()).await);
            self.states.insert(name.clone(), state);
            if let Err(err) =
                self.watchers.watch_repo(&name, &path).await
            {
                warn!(repo = %name, %err, "failed to attach watcher");
            }
            outcome.added.push(repo);
        }

        if !outcome.added.is_empty() {
            self.bus.emit_domain(&DomainEvent::RepoBulkAdded {
                repos: outcome.added.clone(),
            });
            let _ = self.frames.send(ServerFrame::RepoChange {
                action: RepoChangeAction::BulkAdded,
                repo: None,
                repos: Some(outcome.added.clone()),
            });
        }
        outcome
    }

    /// Re-parse one repo, swap its snapshot atomically, diff against
    /// the prior snapshot, and broadcast.
    pub async fn refresh(&self, name: &str) -> Result<Arc<RepoState>> {
        let store = self.store.lock().await;
        let repo = store
            .config()
            .repo(name)
            .ok_or_else(|| CoreError::RepoNotFound(name.to_owned()))?
            .clone();

        let state = Arc::new(parse_into_state(repo.path).await);
        let prior = self
            .states
            .insert(name.to_owned(), Arc::clone(&state));
        drop(store);

        let events =
            detect_changes(name, prior.as_deref(), &state);
        debug!(repo = %name, events = events.len(), "refresh complete");
        for event in &events {
            self.bus.emit_domain(event);
        }

        let _ = self.frames.send(ServerFrame::update(name, &state));
        Ok(state)
    }

    /// Edit the `status:` frontmatter line of a work effort's source
    /// file. The filesystem is the source of truth: no in-memory state
    /// is touched here, the watcher drives the refresh cycle.
    pub async fn patch_status(
        &self,
        repo: &str,
        we_id: &str,
        new_status: &str,
    ) -> Result<String> {
        let status = WorkEffortStatus::parse(new_status);
        if !status.is_canonical() {
            return Err(CoreError::InvalidStatus(format!(
                "Invalid status. Must be one of: {}",
                WorkEffortStatus::ALLOWED.join(", ")
            )));
        }

        // Serialize with other mutations; the lookup uses the recorded
        // path of the registry's snapshot rather than guessing from the
        // id.
        let store = self.store.lock().await;
        if !store.config().has_repo(repo) {
            return Err(CoreError::RepoNotFound(repo.to_owned()));
        }
        let state = self
            .states
            .get(repo)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CoreError::RepoNotFound(repo.to_owned()))?;
        let we = state.work_effort(we_id).ok_or_else(|| {
            CoreError::WorkEffortNotFound(we_id.to_owned())
        })?;

        patch_status_file(&we.path, status.as_str())?;
        info!(repo, we_id, status = status.as_str(), "status patched");
        Ok(status.as_str().to_owned())
    }

    /// Immutable snapshot of one repo.
    pub fn snapshot(&self, name: &str) -> Option<Arc<RepoState>> {
        self.states.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Stable copy of the whole repo map, for `init` frames and list
    /// endpoints.
    pub fn snapshot_all(&self) -> BTreeMap<String, RepoState> {
        self.states
            .iter()
            .map(|entry| {
                (entry.key().clone(), entry.value().as_ref().clone())
            })
            .collect()
    }

    pub fn repo_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.states.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub async fn config_snapshot(&self) -> Config {
        self.store.lock().await.config().clone()
    }

    /// Subscribe to the outbound frame stream.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<ServerFrame> {
        self.frames.subscribe()
    }

    /// Handle for auxiliary frame producers (dev asset reload).
    pub fn frame_sender(&self) -> broadcast::Sender<ServerFrame> {
        self.frames.clone()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Tear down watchers; no refresh signals fire after this returns.
    pub async fn shutdown(&self) {
        self.watchers.close().await;
        self.bus.emit_domain(&DomainEvent::Shutdown);
    }
}

async fn parse_into_state(path: PathBuf) -> RepoState {
    match spawn_blocking(move || parse_repo(&path)).await {
        Ok(result) => result.into_state(),
        Err(join_err) => {
            error!(%join_err, "repo parse task panicked");
            RepoState::new(
                Vec::new(),
                Some(format!("parse task failed: {join_err}")),
            )
        }
    }
}

/// Consume watcher signals for the registry's lifetime. Holds only a
/// weak handle so a dropped registry ends the pump.
async fn run_signal_pump(
    registry: Weak<RepoRegistry>,
    mut rx: mpsc::Receiver<WatchSignal>,
) {
    while let Some(signal) = rx.recv().await {
        let Some(registry) = registry.upgrade() else { break };
        match signal {
            WatchSignal::Update { repo } => {
                if let Err(err) = registry.refresh(&repo).await {
                    debug!(%repo, %err, "refresh after watch signal failed");
                }
            }
            WatchSignal::Error { repo, cause } => {
                warn!(%repo, %cause, "watcher error");
                registry.bus.emit_domain(&DomainEvent::WatcherError {
                    repo: repo.clone(),
                    message: cause.clone(),
                });
                let _ = registry.frames.send(ServerFrame::Error {
                    repo,
                    message: cause,
                });
            }
        }
    }
}

/// Rewrite the first `status:` line of the frontmatter block, leaving
/// every other byte of the document untouched. A narrow anchored edit
/// is used instead of a YAML round-trip so user-added fields, comments,
/// and key order survive exactly.
fn patch_status_file(path: &Path, new_status: &str) -> Result<()> {
    let raw = std::fs::read_to_string(path)?;

    let Some(rest) = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))
    else {
        return Err(CoreError::Internal(format!(
            "no frontmatter in {}",
            path.display()
        )));
    };
    let head_len = raw.len() - rest.len();

    // Confine the edit to the frontmatter block.
    let mut fence_end = rest.len();
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            fence_end = offset;
            break;
        }
        offset += line.len();
    }
    let block = &rest[..fence_end];

    let Some(found) = STATUS_LINE_RE.find(block) else {
        return Err(CoreError::Internal(format!(
            "no status line in {}",
            path.display()
        )));
    };

    let mut patched = String::with_capacity(raw.len());
    patched.push_str(&raw[..head_len + found.start()]);
    patched.push_str(&format!("status: {new_status}"));
    patched.push_str(&raw[head_len + found.end()..]);

    std::fs::write(path, patched)?;
    Ok(())
}
