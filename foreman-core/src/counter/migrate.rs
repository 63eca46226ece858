//! Counter migration: reconcile persisted counters with what the
//! filesystem actually contains.

use foreman_model::{Counters, RepoRef};
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::fs_scan::{scan_counters, FilesystemCounts};
use super::service::CounterService;

/// Audit reason stamped on every migration write.
pub const MIGRATION_REASON: &str = "migration: scan-based initialization";

/// One observed difference between disk and persisted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    /// Dotted counter path.
    pub counter: String,
    /// What the filesystem scan observed.
    pub expected: u64,
    /// What the persisted state holds.
    pub actual: u64,
}

/// Full reconciliation report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub filesystem: FilesystemCounts,
    pub counter_state: Counters,
    pub discrepancies: Vec<Discrepancy>,
    pub needs_migration: bool,
}

/// A `setCounter` operation the migrator would perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedSet {
    pub counter: String,
    pub value: u64,
}

/// Outcome of an executed migration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    pub applied: Vec<ProposedSet>,
}

/// Scan the filesystem and diff it against the persisted counters.
pub async fn report(
    service: &CounterService,
    repos: &[RepoRef],
) -> MigrationReport {
    let filesystem = scan_counters(repos);
    let counter_state = service.current().await;
    let discrepancies = diff(&filesystem, &counter_state);
    MigrationReport {
        needs_migration: !discrepancies.is_empty(),
        filesystem,
        counter_state,
        discrepancies,
    }
}

/// The set operations a migration would issue, without executing them.
pub async fn preview(
    _service: &CounterService,
    repos: &[RepoRef],
) -> Vec<ProposedSet> {
    let filesystem = scan_counters(repos);
    proposed_sets(&filesystem)
}

/// Initialize every counter, global and breakdowns, from the scan.
pub async fn migrate(
    service: &CounterService,
    repos: &[RepoRef],
) -> Result<MigrationResult> {
    let filesystem = scan_counters(repos);
    let sets = proposed_sets(&filesystem);
    for set in &sets {
        service
            .set_counter(&set.counter, set.value, MIGRATION_REASON)
            .await?;
    }
    Ok(MigrationResult { applied: sets })
}

fn proposed_sets(fs: &FilesystemCounts) -> Vec<ProposedSet> {
    let mut sets = vec![ProposedSet {
        counter: "workEfforts.global".to_owned(),
        value: fs.work_efforts_total,
    }];
    for (repo, count) in &fs.work_efforts_by_repo {
        sets.push(ProposedSet {
            counter: format!("workEfforts.byRepo.{repo}"),
            value: *count,
        });
    }
    sets.push(ProposedSet {
        counter: "tickets.global".to_owned(),
        value: fs.tickets_total,
    });
    for (we, count) in &fs.tickets_by_work_effort {
        sets.push(ProposedSet {
            counter: format!("tickets.byWorkEffort.{we}"),
            value: *count,
        });
    }
    for (repo, count) in &fs.tickets_by_repo {
        sets.push(ProposedSet {
            counter: format!("tickets.byRepo.{repo}"),
            value: *count,
        });
    }
    sets.push(ProposedSet {
        counter: "checkpoints.global".to_owned(),
        value: fs.checkpoints_total,
    });
    sets
}

fn diff(fs: &FilesystemCounts, state: &Counters) -> Vec<Discrepancy> {
    let mut out = Vec::new();
    let mut check = |counter: &str, expected: u64, actual: u64| {
        if expected != actual {
            out.push(Discrepancy {
                counter: counter.to_owned(),
                expected,
                actual,
            });
        }
    };

    check(
        "workEfforts.global",
        fs.work_efforts_total,
        state.work_efforts.global,
    );
    for (repo, expected) in &fs.work_efforts_by_repo {
        check(
            &format!("workEfforts.byRepo.{repo}"),
            *expected,
            state
                .work_efforts
                .by_repo
                .get(repo)
                .copied()
                .unwrap_or_default(),
        );
    }
    check("tickets.global", fs.tickets_total, state.tickets.global);
    for (we, expected) in &fs.tickets_by_work_effort {
        check(
            &format!("tickets.byWorkEffort.{we}"),
            *expected,
            state
                .tickets
                .by_work_effort
                .get(we)
                .copied()
                .unwrap_or_default(),
        );
    }
    for (repo, expected) in &fs.tickets_by_repo {
        check(
            &format!("tickets.byRepo.{repo}"),
            *expected,
            state
                .tickets
                .by_repo
                .get(repo)
                .copied()
                .unwrap_or_default(),
        );
    }
    check(
        "checkpoints.global",
        fs.checkpoints_total,
        state.checkpoints.global,
    );
    out
}
