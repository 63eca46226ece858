//! Counter validation: named checks over persisted state versus the
//! filesystem, with auto-applicable repair suggestions.

use chrono::{DateTime, Utc};
use foreman_model::{RepoRef, ValidationStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::Result;

use super::fs_scan::scan_counters;
use super::service::CounterService;

pub const CHECK_WORK_EFFORTS: &str = "Work Efforts Count";
pub const CHECK_TICKETS: &str = "Tickets Count";
pub const CHECK_TICKETS_PER_WE: &str = "Per-Work-Effort Ticket Counts";
pub const CHECK_CHECKSUM: &str = "Integrity Checksum";
pub const CHECK_ID_FORMAT: &str = "ID Format Consistency";

/// Outcome of one named check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<serde_json::Value>,
    pub message: String,
}

/// What a suggestion would do. `SetCounter` and `RecalculateChecksum`
/// are auto-applicable; everything else needs a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SuggestionAction {
    SetCounter { counter: String, value: u64 },
    RecalculateChecksum,
    ManualReview { note: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    #[serde(flatten)]
    pub action: SuggestionAction,
    pub reason: String,
}

impl Suggestion {
    pub fn auto_applicable(&self) -> bool {
        !matches!(self.action, SuggestionAction::ManualReview { .. })
    }
}

/// Full validation report. Accepted back verbatim by the repair
/// endpoint, so it round-trips through serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub checks: Vec<CheckResult>,
    pub suggestions: Vec<Suggestion>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of applying a report's suggestions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairResult {
    pub success_count: usize,
    pub skipped_count: usize,
    pub applied: Vec<String>,
}

/// Run all check categories.
pub async fn validate(
    service: &CounterService,
    repos: &[RepoRef],
) -> Result<ValidationReport> {
    let fs = scan_counters(repos);
    let counters = service.current().await;

    let mut checks = Vec::new();
    let mut suggestions = Vec::new();

    let we_ok = counters.work_efforts.global == fs.work_efforts_total;
    checks.push(CheckResult {
        name: CHECK_WORK_EFFORTS.to_owned(),
        passed: we_ok,
        actual: Some(json!(counters.work_efforts.global)),
        expected: Some(json!(fs.work_efforts_total)),
        message: if we_ok {
            "global work effort counter matches filesystem".to_owned()
        } else {
            format!(
                "counter has {} but filesystem has {}",
                counters.work_efforts.global, fs.work_efforts_total
            )
        },
    });
    if !we_ok {
        suggestions.push(Suggestion {
            action: SuggestionAction::SetCounter {
                counter: "workEfforts.global".to_owned(),
                value: fs.work_efforts_total,
            },
            reason: format!("auto-repair: {CHECK_WORK_EFFORTS}"),
        });
    }

    let tickets_ok = counters.tickets.global == fs.tickets_total;
    checks.push(CheckResult {
        name: CHECK_TICKETS.to_owned(),
        passed: tickets_ok,
        actual: Some(json!(counters.tickets.global)),
        expected: Some(json!(fs.tickets_total)),
        message: if tickets_ok {
            "global ticket counter matches filesystem".to_owned()
        } else {
            format!(
                "counter has {} but filesystem has {}",
                counters.tickets.global, fs.tickets_total
            )
        },
    });
    if !tickets_ok {
        suggestions.push(Suggestion {
            action: SuggestionAction::SetCounter {
                counter: "tickets.global".to_owned(),
                value: fs.tickets_total,
            },
            reason: format!("auto-repair: {CHECK_TICKETS}"),
        });
    }

    // Per-work-effort breakdowns, both directions.
    let mut per_we_mismatches = Vec::new();
    for (we, expected) in &fs.tickets_by_work_effort {
        let actual = counters
            .tickets
            .by_work_effort
            .get(we)
            .copied()
            .unwrap_or_default();
        if actual != *expected {
            per_we_mismatches.push((we.clone(), *expected, actual));
        }
    }
    for (we, actual) in &counters.tickets.by_work_effort {
        if !fs.tickets_by_work_effort.contains_key(we) && *actual != 0 {
            per_we_mismatches.push((we.clone(), 0, *actual));
        }
    }
    let per_we_ok = per_we_mismatches.is_empty();
    checks.push(CheckResult {
        name: CHECK_TICKETS_PER_WE.to_owned(),
        passed: per_we_ok,
        actual: Some(json!(counters.tickets.by_work_effort)),
        expected: Some(json!(fs.tickets_by_work_effort)),
        message: if per_we_ok {
            "per-work-effort ticket counters match filesystem".to_owned()
        } else {
            format!(
                "{} work effort(s) out of sync",
                per_we_mismatches.len()
            )
        },
    });
    for (we, expected, _) in &per_we_mismatches {
        suggestions.push(Suggestion {
            action: SuggestionAction::SetCounter {
                counter: format!("tickets.byWorkEffort.{we}"),
                value: *expected,
            },
            reason: format!("auto-repair: {CHECK_TICKETS_PER_WE}"),
        });
    }

    let checksum_ok = service.verify_integrity().await?;
    checks.push(CheckResult {
        name: CHECK_CHECKSUM.to_owned(),
        passed: checksum_ok,
        actual: None,
        expected: None,
        message: if checksum_ok {
            "stored checksum validates".to_owned()
        } else {
            "stored checksum does not match counter values".to_owned()
        },
    });
    if !checksum_ok {
        suggestions.push(Suggestion {
            action: SuggestionAction::RecalculateChecksum,
            reason: format!("auto-repair: {CHECK_CHECKSUM}"),
        });
    }

    let format_ok = fs.id_format_issues.is_empty();
    checks.push(CheckResult {
        name: CHECK_ID_FORMAT.to_owned(),
        passed: format_ok,
        actual: Some(json!(fs.id_format_issues)),
        expected: Some(json!([])),
        message: if format_ok {
            "identifier formats are consistent".to_owned()
        } else {
            format!("{} naming issue(s) found", fs.id_format_issues.len())
        },
    });
    for issue in &fs.id_format_issues {
        suggestions.push(Suggestion {
            action: SuggestionAction::ManualReview {
                note: issue.clone(),
            },
            reason: format!("manual: {CHECK_ID_FORMAT}"),
        });
    }

    let status = if checks.iter().all(|c| c.passed) {
        ValidationStatus::Valid
    } else {
        ValidationStatus::Invalid
    };

    Ok(ValidationReport {
        status,
        checks,
        suggestions,
        timestamp: Utc::now(),
    })
}

/// Apply a report's auto-applicable suggestions.
pub async fn auto_repair(
    service: &CounterService,
    report: &ValidationReport,
) -> Result<RepairResult> {
    let mut success_count = 0;
    let mut skipped_count = 0;
    let mut applied = Vec::new();

    for suggestion in &report.suggestions {
        match &suggestion.action {
            SuggestionAction::SetCounter { counter, value } => {
                service
                    .set_counter(counter, *value, &suggestion.reason)
                    .await?;
                info!(%counter, value, "repaired counter");
                success_count += 1;
                applied.push(counter.clone());
            }
            SuggestionAction::RecalculateChecksum => {
                service.reseal().await?;
                success_count += 1;
                applied.push("integrity.checksum".to_owned());
            }
            SuggestionAction::ManualReview { .. } => {
                skipped_count += 1;
            }
        }
    }

    Ok(RepairResult {
        success_count,
        skipped_count,
        applied,
    })
}
