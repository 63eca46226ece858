//! Core data model definitions shared across Foreman crates.
#![allow(missing_docs)]

pub mod counter;
pub mod error;
pub mod events;
pub mod frames;
pub mod ids;
pub mod stats;
pub mod status;
pub mod work_effort;

// Intentionally curated re-exports for downstream consumers.
pub use counter::{
    AuditAction, CounterAuditEntry, CounterIntegrity, CounterKind,
    CounterState, Counters, ValidationStatus, AUDIT_LOG_CAP,
    COUNTER_STATE_VERSION,
};
pub use error::{ModelError, Result as ModelResult};
pub use events::DomainEvent;
pub use frames::{ClientFrame, RepoChangeAction, RepoRef, ServerFrame};
pub use ids::{
    ArtifactFormat, CheckpointId, TicketId, WorkEffortId,
    CHECKPOINT_ID_RE, JOHNNY_DECIMAL_ID_RE, TICKET_ID_RE,
    WORK_EFFORT_ID_RE,
};
pub use stats::{FormatCounts, RepoStats};
pub use status::{TicketStatus, WorkEffortStatus};
pub use work_effort::{RepoState, Ticket, WorkEffort};
