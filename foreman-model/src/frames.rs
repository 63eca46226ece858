use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::stats::RepoStats;
use crate::work_effort::{RepoState, WorkEffort};

/// A configured repository: display name plus filesystem root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub name: String,
    pub path: PathBuf,
}

/// Repo-set mutation kinds announced over the transport.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RepoChangeAction {
    Added,
    Removed,
    BulkAdded,
}

/// Frames the server sends to connected clients.
///
/// JSON-encoded, tagged by `type`. A client always receives exactly one
/// `init` before any other frame in its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Initial full snapshot, sent once per client after handshake.
    Init {
        repos: BTreeMap<String, RepoState>,
    },
    /// One repository's new state.
    #[serde(rename_all = "camelCase")]
    Update {
        repo: String,
        work_efforts: Vec<WorkEffort>,
        stats: RepoStats,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// The set of configured repositories changed.
    RepoChange {
        action: RepoChangeAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repo: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repos: Option<Vec<RepoRef>>,
    },
    /// Recoverable server-side error referencing a repo.
    Error { repo: String, message: String },
    /// Dev-only asset change notification.
    HotReload { file: String },
}

impl ServerFrame {
    /// Build an `update` frame from a repo snapshot.
    pub fn update(repo: impl Into<String>, state: &RepoState) -> Self {
        Self::Update {
            repo: repo.into(),
            work_efforts: state.work_efforts.clone(),
            stats: state.stats.clone(),
            error: state.error.clone(),
        }
    }

    /// `init` frames must never be dropped under back-pressure.
    pub fn is_init(&self) -> bool {
        matches!(self, Self::Init { .. })
    }
}

/// Frames clients may send to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Force a re-parse of one repository.
    Refresh { repo: String },
}
