//! End-to-end pipeline: a file written on disk flows through the
//! watcher, the parser, the change detector, and out as an update
//! frame.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use foreman_config::{Config, ConfigStore};
use foreman_core::events::EventBus;
use foreman_core::RepoRegistry;
use foreman_model::{RepoRef, ServerFrame};
use parking_lot::Mutex;
use tempfile::tempdir;

fn seed_work_effort(repo_root: &Path, id: &str, status: &str) {
    let dir = repo_root.join(format!("_work_efforts/{id}_demo"));
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join(format!("{id}_index.md")),
        format!(
            "---\nid: {id}\ntitle: \"Demo {id}\"\nstatus: {status}\n---\n"
        ),
    )
    .unwrap();
}

async fn registry_for(
    config_path: &Path,
    repos: Vec<RepoRef>,
) -> Arc<RepoRegistry> {
    let config = Config {
        repos,
        // Tight windows keep the test fast while still exercising the
        // debounce/throttle path.
        debounce_ms: 100,
        throttle_ms: 200,
        ..Config::default()
    };
    let store = ConfigStore::from_config(config_path, config);
    store.save().unwrap();
    let registry = RepoRegistry::new(store, EventBus::new());
    registry.init().await.unwrap();
    registry
}

#[tokio::test]
async fn disk_write_reaches_subscribers_as_update_frame() {
    let repo_dir = tempdir().unwrap();
    let config_dir = tempdir().unwrap();
    seed_work_effort(repo_dir.path(), "WE-260501-ab12", "active");

    let registry = registry_for(
        &config_dir.path().join("config.json"),
        vec![RepoRef {
            name: "_pyrite".into(),
            path: repo_dir.path().to_path_buf(),
        }],
    )
    .await;

    let created = Arc::new(Mutex::new(Vec::new()));
    let sink = created.clone();
    registry.event_bus().on("workeffort:created", move |event| {
        sink.lock().push(event.data["id"].clone());
    });

    let mut frames = registry.subscribe_frames();

    // Give the notify backend a moment to arm before writing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    seed_work_effort(repo_dir.path(), "WE-260501-cd34", "active");

    let work_efforts =
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let ServerFrame::Update {
                    repo, work_efforts, ..
                } = frames.recv().await.unwrap()
                {
                    if repo == "_pyrite" && work_efforts.len() == 2 {
                        break work_efforts;
                    }
                }
            }
        })
        .await
        .expect("no update frame within the refresh bound");

    assert!(work_efforts
        .iter()
        .any(|we| we.id.as_str() == "WE-260501-cd34"));

    // Exactly one creation event for the new record.
    let created = created.lock();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0], "WE-260501-cd34");
}

#[tokio::test]
async fn shutdown_silences_the_watcher() {
    let repo_dir = tempdir().unwrap();
    let config_dir = tempdir().unwrap();
    seed_work_effort(repo_dir.path(), "WE-260501-ab12", "active");

    let registry = registry_for(
        &config_dir.path().join("config.json"),
        vec![RepoRef {
            name: "_pyrite".into(),
            path: repo_dir.path().to_path_buf(),
        }],
    )
    .await;

    let mut frames = registry.subscribe_frames();
    registry.shutdown().await;

    seed_work_effort(repo_dir.path(), "WE-260501-cd34", "active");
    let result = tokio::time::timeout(
        Duration::from_millis(800),
        frames.recv(),
    )
    .await;
    // No refresh signal fires after teardown.
    assert!(result.is_err());
}
