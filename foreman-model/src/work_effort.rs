use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ArtifactFormat, TicketId, WorkEffortId};
use crate::stats::RepoStats;
use crate::status::{TicketStatus, WorkEffortStatus};

/// A top-level unit of tracked work parsed from one artifact on disk.
///
/// Timestamps carried in frontmatter are forwarded verbatim; the parser
/// does not re-interpret what a user wrote into their files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkEffort {
    pub id: WorkEffortId,
    pub format: ArtifactFormat,
    pub title: String,
    pub status: WorkEffortStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Johnny Decimal category directory name, `None` for MCP records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tickets: Vec<Ticket>,
    /// Absolute path of the source file.
    pub path: PathBuf,
    /// Per-file parse error note; the record still counts toward stats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkEffort {
    /// A record with default fields, used when a file is recognized but
    /// its contents cannot be parsed.
    pub fn placeholder(
        id: WorkEffortId,
        format: ArtifactFormat,
        title: impl Into<String>,
        path: PathBuf,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id,
            format,
            title: title.into(),
            status: WorkEffortStatus::default(),
            created: None,
            last_updated: None,
            repository: None,
            branch: None,
            category: None,
            tickets: Vec::new(),
            path,
            error: Some(error.into()),
        }
    }
}

/// A unit of work belonging to a single work effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
    pub status: TicketStatus,
    pub parent: WorkEffortId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// In-memory snapshot of a single repository's parsed state.
///
/// Snapshots are immutable once published; a refresh replaces the whole
/// value rather than patching it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoState {
    pub work_efforts: Vec<WorkEffort>,
    pub stats: RepoStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl RepoState {
    pub fn new(
        work_efforts: Vec<WorkEffort>,
        error: Option<String>,
    ) -> Self {
        let stats = RepoStats::collect(&work_efforts);
        Self {
            work_efforts,
            stats,
            error,
            last_updated: Utc::now(),
        }
    }

    /// Look up a work effort by id.
    pub fn work_effort(&self, id: &str) -> Option<&WorkEffort> {
        self.work_efforts.iter().find(|we| we.id.as_str() == id)
    }
}
