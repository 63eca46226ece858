//! Durable sequential counter issuance.
//!
//! All mutation goes through one per-process lock; every mutating
//! operation reseals the integrity checksum and writes the state file
//! atomically before returning. The checksum covers the canonical JSON
//! of `{version, counters}` only, so integrity metadata and the audit
//! log can change without invalidating it.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use foreman_model::{
    AuditAction, CounterAuditEntry, CounterKind, CounterState, Counters,
    ValidationStatus,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::persist::{atomic_write_json, backup_file_name};

/// Breakdown dimensions attached to an issuance.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_we: Option<String>,
}

/// Checksum scope: serialization order of these two fields is the
/// canonicalization contract.
#[derive(Serialize)]
struct ChecksumScope<'a> {
    version: &'a str,
    counters: &'a Counters,
}

/// Hex SHA-256 over the canonical `{version, counters}` JSON.
pub fn checksum(version: &str, counters: &Counters) -> String {
    let scope = ChecksumScope { version, counters };
    let json = serde_json::to_vec(&scope)
        .expect("counter state serialization is infallible");
    let digest = Sha256::digest(&json);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Read-only statistics snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterStatistics {
    pub counters: Counters,
    pub tracked_repos: usize,
    pub tracked_work_efforts: usize,
    pub audit_entries: usize,
    pub validation_status: ValidationStatus,
    pub created: chrono::DateTime<Utc>,
    pub last_updated: chrono::DateTime<Utc>,
}

/// Outcome of an administrative counter override.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetOutcome {
    pub counter: String,
    pub old_value: u64,
    pub new_value: u64,
}

/// Issues sequential identifiers for work efforts, tickets, and
/// checkpoints with per-repo and per-work-effort breakdowns.
#[derive(Debug)]
pub struct CounterService {
    path: PathBuf,
    state: Mutex<CounterState>,
}

impl CounterService {
    /// Load persisted state, initializing a fresh document when the
    /// file is absent. A checksum mismatch is backed up immediately and
    /// surfaces through `verify_integrity`; an unparseable file is
    /// backed up and replaced, because losing counter durability is
    /// preferred to refusing to run.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<CounterState>(&raw) {
                Ok(state) => {
                    let expected =
                        checksum(&state.version, &state.counters);
                    if expected != state.integrity.checksum {
                        warn!(
                            path = %path.display(),
                            "counter state checksum mismatch, backing up"
                        );
                        write_backup(&path, &raw);
                    }
                    state
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        %err,
                        "counter state unreadable, backing up and reinitializing"
                    );
                    write_backup(&path, &raw);
                    sealed_initial()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "initializing counter state");
                sealed_initial()
            }
            Err(err) => return Err(err.into()),
        };

        let service = Self {
            path,
            state: Mutex::new(state),
        };
        Ok(service)
    }

    /// Issue the next identifier for `kind`, updating breakdowns from
    /// the context and returning the new global value.
    pub async fn next(
        &self,
        kind: CounterKind,
        ctx: CounterContext,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;

        let value = {
            let counters = &mut state.counters;
            match kind {
                CounterKind::WorkEffort => {
                    counters.work_efforts.global += 1;
                    if let Some(repo) = &ctx.repo {
                        *counters
                            .work_efforts
                            .by_repo
                            .entry(repo.clone())
                            .or_default() += 1;
                    }
                    counters.work_efforts.global
                }
                CounterKind::Ticket => {
                    counters.tickets.global += 1;
                    if let Some(repo) = &ctx.repo {
                        *counters
                            .tickets
                            .by_repo
                            .entry(repo.clone())
                            .or_default() += 1;
                    }
                    if let Some(we) = &ctx.parent_we {
                        *counters
                            .tickets
                            .by_work_effort
                            .entry(we.clone())
                            .or_default() += 1;
                    }
                    counters.tickets.global
                }
                CounterKind::Checkpoint => {
                    counters.checkpoints.global += 1;
                    counters.checkpoints.global
                }
            }
        };

        state.push_audit(CounterAuditEntry {
            timestamp: Utc::now(),
            action: AuditAction::Increment,
            counter: format!("{}.global", kind.path_prefix()),
            value: Some(value),
            old_value: None,
            new_value: None,
            context: serde_json::to_value(&ctx).ok().filter(|v| {
                v.as_object().is_some_and(|o| !o.is_empty())
            }),
            reason: None,
        });

        self.seal_and_save(&mut state)?;
        Ok(value)
    }

    /// Administrative override of one counter by dotted path, creating
    /// intermediate entries as needed. Audited with both old and new
    /// values plus the caller's reason.
    pub async fn set_counter(
        &self,
        dotted_path: &str,
        value: u64,
        reason: &str,
    ) -> Result<SetOutcome> {
        let mut state = self.state.lock().await;

        let slot = resolve_slot(&mut state.counters, dotted_path)?;
        let old_value = *slot;
        *slot = value;

        state.push_audit(CounterAuditEntry {
            timestamp: Utc::now(),
            action: AuditAction::Set,
            counter: dotted_path.to_owned(),
            value: None,
            old_value: Some(old_value),
            new_value: Some(value),
            context: None,
            reason: Some(reason.to_owned()),
        });

        self.seal_and_save(&mut state)?;
        Ok(SetOutcome {
            counter: dotted_path.to_owned(),
            old_value,
            new_value: value,
        })
    }

    /// Current counter values.
    pub async fn current(&self) -> Counters {
        self.state.lock().await.counters.clone()
    }

    /// Most recent audit entries, newest last.
    pub async fn audit_log(&self, limit: usize) -> Vec<CounterAuditEntry> {
        let state = self.state.lock().await;
        let skip = state.audit.len().saturating_sub(limit);
        state.audit.iter().skip(skip).cloned().collect()
    }

    pub async fn statistics(&self) -> CounterStatistics {
        let state = self.state.lock().await;
        CounterStatistics {
            counters: state.counters.clone(),
            tracked_repos: state
                .counters
                .work_efforts
                .by_repo
                .len()
                .max(state.counters.tickets.by_repo.len()),
            tracked_work_efforts: state
                .counters
                .tickets
                .by_work_effort
                .len(),
            audit_entries: state.audit.len(),
            validation_status: state.integrity.validation_status,
            created: state.created,
            last_updated: state.last_updated,
        }
    }

    /// Recompute the checksum and compare against the stored one,
    /// recording the outcome. Does not repair; see
    /// [`CounterService::reseal`].
    pub async fn verify_integrity(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        let expected = checksum(&state.version, &state.counters);
        let valid = expected == state.integrity.checksum;
        state.integrity.last_validation = Utc::now();
        state.integrity.validation_status = if valid {
            ValidationStatus::Valid
        } else {
            ValidationStatus::Invalid
        };
        atomic_write_json(&self.path, &*state)?;
        Ok(valid)
    }

    /// Recompute and store a fresh checksum over the current values.
    /// The recovery path once a mismatch has been backed up.
    pub async fn reseal(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        info!("resealing counter state checksum");
        self.seal_and_save(&mut state)
    }

    /// Snapshot of the full persisted document.
    pub async fn state_snapshot(&self) -> CounterState {
        self.state.lock().await.clone()
    }

    fn seal_and_save(&self, state: &mut CounterState) -> Result<()> {
        let now = Utc::now();
        state.last_updated = now;
        state.integrity.checksum =
            checksum(&state.version, &state.counters);
        state.integrity.last_validation = now;
        state.integrity.validation_status = ValidationStatus::Valid;
        atomic_write_json(&self.path, state)
    }
}

fn sealed_initial() -> CounterState {
    let mut state = CounterState::initial();
    state.integrity.checksum =
        checksum(&state.version, &state.counters);
    state
}

fn write_backup(path: &Path, raw: &str) {
    let backup = backup_file_name(path, Utc::now());
    if let Err(err) = fs::write(&backup, raw) {
        warn!(
            backup = %backup.display(),
            %err,
            "failed to write counter state backup"
        );
    } else {
        info!(backup = %backup.display(), "counter state backed up");
    }
}

/// Walk a dotted path to the addressed counter slot. Breakdown keys may
/// themselves contain dots, so everything after the map segment is one
/// key.
fn resolve_slot<'a>(
    counters: &'a mut Counters,
    dotted_path: &str,
) -> Result<&'a mut u64> {
    let mut parts = dotted_path.splitn(3, '.');
    let root = parts.next().unwrap_or_default();
    let field = parts.next().unwrap_or_default();
    let rest = parts.next();

    let bad_path = || {
        CoreError::Counter(format!("unknown counter path: {dotted_path}"))
    };

    match (root, field, rest) {
        ("workEfforts", "global", None) => {
            Ok(&mut counters.work_efforts.global)
        }
        ("workEfforts", "byRepo", Some(repo)) => Ok(counters
            .work_efforts
            .by_repo
            .entry(repo.to_owned())
            .or_default()),
        ("tickets", "global", None) => Ok(&mut counters.tickets.global),
        ("tickets", "byRepo", Some(repo)) => Ok(counters
            .tickets
            .by_repo
            .entry(repo.to_owned())
            .or_default()),
        ("tickets", "byWorkEffort", Some(we)) => Ok(counters
            .tickets
            .by_work_effort
            .entry(we.to_owned())
            .or_default()),
        ("checkpoints", "global", None) => {
            Ok(&mut counters.checkpoints.global)
        }
        _ => Err(bad_path()),
    }
}
