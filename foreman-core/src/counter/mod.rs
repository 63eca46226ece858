//! Global counter service: durable sequential identifier issuance with
//! integrity checking, plus filesystem reconciliation tooling.

pub mod fs_scan;
pub mod migrate;
pub mod service;
pub mod validate;

pub use fs_scan::{scan_counters, FilesystemCounts};
pub use migrate::{MigrationReport, ProposedSet};
pub use service::{checksum, CounterContext, CounterService};
pub use validate::{
    CheckResult, RepairResult, Suggestion, SuggestionAction,
    ValidationReport,
};
