//! Filesystem watch pipeline for repository refresh signals.
//!
//! A thin wrapper around `notify` that debounces raw filesystem
//! notifications into per-repository refresh signals. The watcher owns
//! timers and subscriptions only; parsing and state belong to the
//! registry.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path};
use std::sync::Arc;

use notify::{
    Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode,
    Watcher,
};
use tokio::sync::{mpsc, RwLock};
use tokio::task::{spawn_blocking, JoinHandle};
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::scan::parser::work_efforts_dir;

/// Configuration knobs for watch processing.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Debounce window for coalescing rapid event bursts per repo.
    pub debounce: Duration,
    /// Minimum separation between successive update emissions per repo.
    pub throttle: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            throttle: Duration::from_secs(2),
        }
    }
}

impl WatchConfig {
    pub fn from_millis(debounce_ms: u64, throttle_ms: u64) -> Self {
        Self {
            debounce: Duration::from_millis(debounce_ms.max(1)),
            throttle: Duration::from_millis(throttle_ms),
        }
    }
}

/// Signals delivered to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    /// The repo changed on disk and should be re-parsed soon.
    Update { repo: String },
    /// Terminal condition for this watch; the registry decides
    /// remediation.
    Error { repo: String, cause: String },
}

enum WatchMessage {
    Event(Event),
    Error(String),
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("kind", &event.kind)
                .field("path_count", &event.paths.len())
                .finish(),
            WatchMessage::Error(message) => f
                .debug_struct("WatchMessage::Error")
                .field("message", message)
                .finish(),
        }
    }
}

/// Dispatches debounced filesystem notifications for a set of repos.
pub struct WatcherSet {
    config: WatchConfig,
    signals: mpsc::Sender<WatchSignal>,
    repos: Arc<RwLock<HashMap<String, RepoWatch>>>,
}

impl fmt::Debug for WatcherSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("WatcherSet");
        debug.field("config", &self.config);
        match self.repos.try_read() {
            Ok(guard) => {
                let active = guard
                    .values()
                    .filter(|entry| entry.watcher.is_some())
                    .count();
                debug
                    .field("repo_count", &guard.len())
                    .field("active_watchers", &active);
            }
            Err(_) => {
                debug.field("repos", &"<locked>");
            }
        }
        debug.finish()
    }
}

struct RepoWatch {
    watcher: Option<RecommendedWatcher>,
    pump_task: JoinHandle<()>,
}

impl RepoWatch {
    fn shutdown(self) {
        self.pump_task.abort();
        // Dropping `watcher` stops the notify stream.
    }
}

impl WatcherSet {
    pub fn new(
        config: WatchConfig,
        signals: mpsc::Sender<WatchSignal>,
    ) -> Self {
        Self {
            config,
            signals,
            repos: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Attach a notify watcher for the repo's work-efforts tree.
    /// Events are debounced and forwarded as [`WatchSignal::Update`].
    pub async fn watch_repo(
        &self,
        name: &str,
        repo_root: &Path,
    ) -> Result<()> {
        {
            let guard = self.repos.read().await;
            if guard.contains_key(name) {
                return Ok(());
            }
        }

        let root = work_efforts_dir(repo_root).ok_or_else(|| {
            CoreError::Watch(format!(
                "no work-efforts directory under {}",
                repo_root.display()
            ))
        })?;

        let (tx, rx) = mpsc::channel::<WatchMessage>(1024);
        let pump_task = tokio::spawn(debounce_loop(
            name.to_owned(),
            rx,
            self.signals.clone(),
            self.config.clone(),
        ));

        let mut guard = self.repos.write().await;
        if guard.contains_key(name) {
            pump_task.abort();
            return Ok(());
        }
        guard.insert(
            name.to_owned(),
            RepoWatch {
                watcher: None,
                pump_task,
            },
        );
        drop(guard);

        let repos = Arc::clone(&self.repos);
        let signals = self.signals.clone();
        let repo = name.to_owned();
        tokio::spawn(async move {
            let build =
                spawn_blocking(move || init_watcher(&root, tx)).await;
            match build {
                Ok(Ok(watcher)) => {
                    let mut guard = repos.write().await;
                    if let Some(entry) = guard.get_mut(&repo) {
                        entry.watcher = Some(watcher);
                    }
                }
                Ok(Err(err)) => {
                    let cause = err.to_string();
                    if let Some(entry) =
                        repos.write().await.remove(&repo)
                    {
                        entry.shutdown();
                    }
                    let _ = signals
                        .send(WatchSignal::Error { repo, cause })
                        .await;
                }
                Err(join_err) => {
                    let cause = format!(
                        "watcher initialization panicked: {join_err}"
                    );
                    if let Some(entry) =
                        repos.write().await.remove(&repo)
                    {
                        entry.shutdown();
                    }
                    let _ = signals
                        .send(WatchSignal::Error { repo, cause })
                        .await;
                }
            }
        });

        Ok(())
    }

    /// Stop watching the named repo.
    pub async fn unwatch_repo(&self, name: &str) {
        if let Some(watch) = self.repos.write().await.remove(name) {
            watch.shutdown();
        }
    }

    /// Tear down all watches. Guarantees no further emissions for any
    /// repo once this returns.
    pub async fn close(&self) {
        let mut guard = self.repos.write().await;
        let watches: Vec<_> =
            guard.drain().map(|(_, watch)| watch).collect();
        drop(guard);
        for watch in watches {
            watch.shutdown();
        }
    }

    #[cfg(test)]
    pub async fn watcher_count(&self) -> usize {
        self.repos.read().await.len()
    }
}

/// Per-repo pump: collapse raw event bursts into one trailing update.
///
/// The emission instant is pushed out by every relevant event to
/// `now + debounce`, floored at `last_emit + throttle`, which yields
/// both the debounce-reset and the coalesced trailing emission the
/// throttle window requires.
async fn debounce_loop(
    repo: String,
    mut rx: mpsc::Receiver<WatchMessage>,
    signals: mpsc::Sender<WatchSignal>,
    config: WatchConfig,
) {
    let mut emit_at: Option<Instant> = None;
    let mut last_emit: Option<Instant> = None;

    loop {
        let msg = match emit_at {
            None => rx.recv().await,
            Some(deadline) => {
                match timeout_at(deadline, rx.recv()).await {
                    Ok(msg) => msg,
                    Err(_) => {
                        emit_at = None;
                        last_emit = Some(Instant::now());
                        if signals
                            .send(WatchSignal::Update {
                                repo: repo.clone(),
                            })
                            .await
                            .is_err()
                        {
                            break;
                        }
                        continue;
                    }
                }
            }
        };

        // Channel closed: teardown. Armed timers are dropped, not
        // fired, so close() never produces a trailing emission.
        let Some(msg) = msg else { break };

        match msg {
            WatchMessage::Event(event) => {
                if !event_is_relevant(&event) {
                    continue;
                }
                let now = Instant::now();
                let mut at = now + config.debounce;
                if let Some(last) = last_emit {
                    at = at.max(last + config.throttle);
                }
                emit_at = Some(at);
            }
            WatchMessage::Error(cause) => {
                let _ = signals
                    .send(WatchSignal::Error { repo: repo.clone(), cause })
                    .await;
                break;
            }
        }
    }
}

/// Filter out noise the registry should never re-parse for: `.git`
/// trees, hidden dotfiles, and editor swap artifacts.
fn event_is_relevant(event: &Event) -> bool {
    event.paths.iter().any(|p| path_is_relevant(p))
}

fn path_is_relevant(path: &Path) -> bool {
    for component in path.components() {
        if let Component::Normal(seg) = component {
            let name = seg.to_string_lossy();
            if name == ".git" || name.starts_with('.') {
                return false;
            }
        }
    }

    let name = path
        .file_name()
        .map(OsStr::to_string_lossy)
        .unwrap_or_default();
    if name.ends_with('~')
        || name.ends_with(".swp")
        || name.ends_with(".swo")
        || name.ends_with(".tmp")
    {
        return false;
    }
    true
}

fn init_watcher(
    root: &Path,
    tx: mpsc::Sender<WatchMessage>,
) -> Result<RecommendedWatcher> {
    let path_label = root.display().to_string();
    let tx_event = tx;
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                if let Err(err) =
                    tx_event.blocking_send(WatchMessage::Event(event))
                {
                    debug!(
                        "watch channel send failed for {path_label}: {err}"
                    );
                }
            }
            Err(err) => {
                let _ = tx_event
                    .blocking_send(WatchMessage::Error(err.to_string()));
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|err| {
        CoreError::Watch(format!(
            "failed to create watcher for {}: {err}",
            root.display()
        ))
    })?;

    if let Err(err) = watcher.watch(root, RecursiveMode::Recursive) {
        warn!(root = %root.display(), %err, "failed to start watch");
        return Err(CoreError::Watch(format!(
            "failed to watch {}: {err}",
            root.display()
        )));
    }

    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn file_event(path: &str) -> WatchMessage {
        let mut event = Event::new(EventKind::Create(CreateKind::File));
        event = event.add_path(PathBuf::from(path));
        WatchMessage::Event(event)
    }

    #[tokio::test]
    async fn watches_and_unwatches_repo() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("_work_efforts")).unwrap();

        let (signal_tx, _signal_rx) = mpsc::channel(16);
        let set = WatcherSet::new(WatchConfig::default(), signal_tx);

        set.watch_repo("demo", tmp.path()).await.unwrap();
        assert_eq!(set.watcher_count().await, 1);
        set.unwatch_repo("demo").await;
        assert_eq!(set.watcher_count().await, 0);
    }

    #[tokio::test]
    async fn missing_work_efforts_dir_is_an_error() {
        let tmp = tempdir().unwrap();
        let (signal_tx, _signal_rx) = mpsc::channel(16);
        let set = WatcherSet::new(WatchConfig::default(), signal_tx);
        assert!(set.watch_repo("demo", tmp.path()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_into_one_update() {
        let (raw_tx, raw_rx) = mpsc::channel(64);
        let (signal_tx, mut signal_rx) = mpsc::channel(16);
        let config = WatchConfig::from_millis(300, 2000);
        let pump = tokio::spawn(debounce_loop(
            "demo".into(),
            raw_rx,
            signal_tx,
            config,
        ));

        for _ in 0..5 {
            raw_tx
                .send(file_event("/repo/_work_efforts/WE.md"))
                .await
                .unwrap();
            tokio::time::advance(Duration::from_millis(50)).await;
        }

        tokio::time::advance(Duration::from_millis(400)).await;
        let signal = signal_rx.recv().await.unwrap();
        assert_eq!(signal, WatchSignal::Update { repo: "demo".into() });

        // Nothing further pending.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(signal_rx.try_recv().is_err());
        pump.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_floor_separates_emissions() {
        let (raw_tx, raw_rx) = mpsc::channel(64);
        let (signal_tx, mut signal_rx) = mpsc::channel(16);
        let config = WatchConfig::from_millis(300, 2000);
        let pump = tokio::spawn(debounce_loop(
            "demo".into(),
            raw_rx,
            signal_tx,
            config,
        ));

        raw_tx
            .send(file_event("/repo/_work_efforts/a.md"))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(350)).await;
        let first = tokio::time::Instant::now();
        assert!(signal_rx.recv().await.is_some());

        // A quick follow-up burst must wait out the throttle floor.
        raw_tx
            .send(file_event("/repo/_work_efforts/b.md"))
            .await
            .unwrap();
        assert!(signal_rx.try_recv().is_err());
        tokio::time::advance(Duration::from_millis(2100)).await;
        assert!(signal_rx.recv().await.is_some());
        assert!(
            tokio::time::Instant::now() - first
                >= Duration::from_millis(2000)
        );
        pump.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn ignored_paths_never_emit() {
        let (raw_tx, raw_rx) = mpsc::channel(64);
        let (signal_tx, mut signal_rx) = mpsc::channel(16);
        let pump = tokio::spawn(debounce_loop(
            "demo".into(),
            raw_rx,
            signal_tx,
            WatchConfig::from_millis(300, 2000),
        ));

        for path in [
            "/repo/_work_efforts/.git/HEAD",
            "/repo/_work_efforts/.hidden.md",
            "/repo/_work_efforts/WE-260501-ab12_x/index.md.swp",
            "/repo/_work_efforts/draft.md~",
        ] {
            raw_tx.send(file_event(path)).await.unwrap();
        }

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(signal_rx.try_recv().is_err());
        pump.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn close_drains_armed_timers_without_emitting() {
        let (raw_tx, raw_rx) = mpsc::channel(64);
        let (signal_tx, mut signal_rx) = mpsc::channel(16);
        let pump = tokio::spawn(debounce_loop(
            "demo".into(),
            raw_rx,
            signal_tx,
            WatchConfig::from_millis(300, 2000),
        ));

        raw_tx
            .send(file_event("/repo/_work_efforts/a.md"))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(100)).await;
        drop(raw_tx);

        pump.await.unwrap();
        assert!(signal_rx.recv().await.is_none());
    }
}
