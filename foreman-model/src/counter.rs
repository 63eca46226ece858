use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Layout version stamped into persisted counter state.
pub const COUNTER_STATE_VERSION: &str = "1.0.0";

/// Maximum retained audit entries; older entries are dropped first.
pub const AUDIT_LOG_CAP: usize = 1000;

/// Entity kinds the counter service issues identifiers for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum CounterKind {
    WorkEffort,
    Ticket,
    Checkpoint,
}

impl CounterKind {
    /// Dotted-path prefix of this kind inside [`Counters`].
    pub fn path_prefix(&self) -> &'static str {
        match self {
            CounterKind::WorkEffort => "workEfforts",
            CounterKind::Ticket => "tickets",
            CounterKind::Checkpoint => "checkpoints",
        }
    }
}

/// Work effort counters: one global sequence plus per-repo breakdowns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkEffortCounters {
    pub global: u64,
    pub by_repo: BTreeMap<String, u64>,
}

/// Ticket counters: global, per parent work effort, per repo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCounters {
    pub global: u64,
    pub by_work_effort: BTreeMap<String, u64>,
    pub by_repo: BTreeMap<String, u64>,
}

/// Checkpoint counters carry only the global sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointCounters {
    pub global: u64,
}

/// All counter values. The serialized key order of this tree is part of
/// the checksum contract; breakdown maps are `BTreeMap` so emission is
/// deterministic across writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub work_efforts: WorkEffortCounters,
    pub tickets: TicketCounters,
    pub checkpoints: CheckpointCounters,
}

/// Outcome of the last integrity validation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    Invalid,
}

/// Integrity metadata, excluded from the checksum scope itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterIntegrity {
    /// Hex SHA-256 over the canonical `{version, counters}` JSON.
    pub checksum: String,
    pub last_validation: DateTime<Utc>,
    pub validation_status: ValidationStatus,
}

/// Mutation classes recorded in the audit log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Increment,
    Set,
}

/// One audit log record. Increments carry `value`; administrative sets
/// carry both `oldValue` and `newValue` plus a mandatory reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    /// Dotted path of the mutated counter, e.g. `workEfforts.global`.
    pub counter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Persistent counter state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterState {
    pub version: String,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub counters: Counters,
    pub integrity: CounterIntegrity,
    #[serde(default)]
    pub audit: VecDeque<CounterAuditEntry>,
}

impl CounterState {
    /// Fresh state with zeroed counters and an empty audit log. The
    /// checksum is left empty; the service seals it before first save.
    pub fn initial() -> Self {
        let now = Utc::now();
        Self {
            version: COUNTER_STATE_VERSION.to_owned(),
            created: now,
            last_updated: now,
            counters: Counters::default(),
            integrity: CounterIntegrity {
                checksum: String::new(),
                last_validation: now,
                validation_status: ValidationStatus::Valid,
            },
            audit: VecDeque::new(),
        }
    }

    /// Append an audit entry, dropping oldest entries beyond the cap.
    pub fn push_audit(&mut self, entry: CounterAuditEntry) {
        if self.audit.len() == AUDIT_LOG_CAP {
            self.audit.pop_front();
        }
        self.audit.push_back(entry);
    }
}
