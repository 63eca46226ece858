//! Dev-only static asset watching.
//!
//! Compiled in behind the `hot-reload` feature: watches an asset
//! directory and pushes `hot_reload` frames so a browser client can
//! refresh itself. Unrelated to repository state.

use std::path::{Path, PathBuf};

use foreman_model::ServerFrame;
use notify::{
    Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode,
    Watcher,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Start watching `assets_dir`, emitting one `hot_reload` frame per
/// changed file. Returns the watcher handle; dropping it stops the
/// stream.
pub fn watch_assets(
    assets_dir: &Path,
    frames: broadcast::Sender<ServerFrame>,
) -> anyhow::Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                for path in event.paths {
                    let file = file_label(&path);
                    let _ = frames
                        .send(ServerFrame::HotReload { file });
                }
            }
            Err(err) => warn!(%err, "asset watch error"),
        },
        NotifyConfig::default(),
    )?;
    watcher.watch(assets_dir, RecursiveMode::Recursive)?;
    info!(dir = %assets_dir.display(), "hot reload watching assets");
    Ok(watcher)
}

fn file_label(path: &PathBuf) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
