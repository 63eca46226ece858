//! Core library for the Foreman mission-control server.
//!
//! Foreman ingests project-management artifacts stored as markdown files
//! on disk, parses them into structured records, watches them for
//! change, and streams a live view of aggregated state to connected
//! clients. This crate holds everything between the filesystem and the
//! transport:
//!
//! - **Parsing**: dual-format artifact parsing and aggregate statistics
//!   ([`scan`])
//! - **Watching**: debounced, throttled per-repository filesystem
//!   watches ([`watch`])
//! - **State**: the repository registry and its refresh pipeline
//!   ([`registry`])
//! - **Counters**: durable sequential identifier issuance with
//!   integrity checking and filesystem reconciliation ([`counter`])
//! - **Events**: the in-process event bus and snapshot change detection
//!   ([`events`])

pub mod counter;
pub mod error;
pub mod events;
pub mod persist;
pub mod registry;
pub mod scan;
pub mod watch;

pub use error::{CoreError, Result};
pub use registry::RepoRegistry;
