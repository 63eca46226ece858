use serde_json::{json, Value};

use crate::frames::RepoRef;
use crate::work_effort::{Ticket, WorkEffort};

/// Typed domain events emitted by the change detector and registry.
///
/// Every event maps to a namespaced type string (`workeffort:*`,
/// `ticket:*`, `repo:*`, `system:*`) used for event-bus subscription
/// matching, plus a JSON payload for consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    WorkEffortCreated {
        repo: String,
        we: WorkEffort,
    },
    /// New status is `completed`.
    WorkEffortCompleted {
        repo: String,
        old_status: String,
        we: WorkEffort,
    },
    /// New status is `active` or `in_progress`.
    WorkEffortStarted {
        repo: String,
        old_status: String,
        we: WorkEffort,
    },
    /// New status is `paused`.
    WorkEffortPaused {
        repo: String,
        old_status: String,
        we: WorkEffort,
    },
    /// Any other status change.
    WorkEffortUpdated {
        repo: String,
        old_status: String,
        we: WorkEffort,
    },
    TicketCreated {
        repo: String,
        ticket: Ticket,
    },
    TicketCompleted {
        repo: String,
        old_status: String,
        ticket: Ticket,
    },
    TicketBlocked {
        repo: String,
        old_status: String,
        ticket: Ticket,
    },
    TicketUpdated {
        repo: String,
        old_status: String,
        ticket: Ticket,
    },
    RepoAdded {
        repo: String,
    },
    RepoRemoved {
        repo: String,
    },
    RepoBulkAdded {
        repos: Vec<RepoRef>,
    },
    WatcherError {
        repo: String,
        message: String,
    },
    Shutdown,
}

impl DomainEvent {
    /// Namespaced type string used for subscription matching.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::WorkEffortCreated { .. } => "workeffort:created",
            Self::WorkEffortCompleted { .. } => "workeffort:completed",
            Self::WorkEffortStarted { .. } => "workeffort:started",
            Self::WorkEffortPaused { .. } => "workeffort:paused",
            Self::WorkEffortUpdated { .. } => "workeffort:updated",
            Self::TicketCreated { .. } => "ticket:created",
            Self::TicketCompleted { .. } => "ticket:completed",
            Self::TicketBlocked { .. } => "ticket:blocked",
            Self::TicketUpdated { .. } => "ticket:updated",
            Self::RepoAdded { .. } => "repo:added",
            Self::RepoRemoved { .. } => "repo:removed",
            Self::RepoBulkAdded { .. } => "repo:bulk_added",
            Self::WatcherError { .. } => "system:watcher_error",
            Self::Shutdown => "system:shutdown",
        }
    }

    /// JSON payload carried on the event bus.
    pub fn payload(&self) -> Value {
        match self {
            Self::WorkEffortCreated { repo, we } => json!({
                "id": we.id,
                "title": we.title,
                "status": we.status,
                "repo": repo,
                "we": we,
            }),
            Self::WorkEffortCompleted { repo, old_status, we }
            | Self::WorkEffortStarted { repo, old_status, we }
            | Self::WorkEffortPaused { repo, old_status, we }
            | Self::WorkEffortUpdated { repo, old_status, we } => json!({
                "id": we.id,
                "title": we.title,
                "oldStatus": old_status,
                "newStatus": we.status,
                "repo": repo,
                "we": we,
            }),
            Self::TicketCreated { repo, ticket } => json!({
                "id": ticket.id,
                "title": ticket.title,
                "status": ticket.status,
                "parent": ticket.parent,
                "repo": repo,
                "ticket": ticket,
            }),
            Self::TicketCompleted { repo, old_status, ticket }
            | Self::TicketBlocked { repo, old_status, ticket }
            | Self::TicketUpdated { repo, old_status, ticket } => json!({
                "id": ticket.id,
                "title": ticket.title,
                "oldStatus": old_status,
                "newStatus": ticket.status,
                "parent": ticket.parent,
                "repo": repo,
                "ticket": ticket,
            }),
            Self::RepoAdded { repo } => json!({ "repo": repo }),
            Self::RepoRemoved { repo } => json!({ "repo": repo }),
            Self::RepoBulkAdded { repos } => json!({ "repos": repos }),
            Self::WatcherError { repo, message } => json!({
                "repo": repo,
                "message": message,
            }),
            Self::Shutdown => json!({}),
        }
    }
}
