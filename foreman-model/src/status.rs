use serde::{Deserialize, Serialize};

/// Lifecycle status of a work effort.
///
/// The canonical vocabulary is fixed, but parsed files may carry anything;
/// unknown strings survive as [`WorkEffortStatus::Other`] so the parser
/// never loses data. Only canonical values pass the API allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkEffortStatus {
    Active,
    InProgress,
    Paused,
    Completed,
    Pending,
    Blocked,
    Other(String),
}

impl WorkEffortStatus {
    /// Canonical values accepted by the status-transition API.
    pub const ALLOWED: [&'static str; 6] = [
        "active",
        "in_progress",
        "paused",
        "completed",
        "pending",
        "blocked",
    ];

    /// Normalize a raw status string to lower-case underscore form and
    /// classify it.
    pub fn parse(raw: &str) -> Self {
        match normalize(raw).as_str() {
            "active" => Self::Active,
            "in_progress" => Self::InProgress,
            "paused" => Self::Paused,
            "completed" => Self::Completed,
            "pending" => Self::Pending,
            "blocked" => Self::Blocked,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Pending => "pending",
            Self::Blocked => "blocked",
            Self::Other(s) => s,
        }
    }

    pub fn is_canonical(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl Default for WorkEffortStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl From<String> for WorkEffortStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<WorkEffortStatus> for String {
    fn from(status: WorkEffortStatus) -> Self {
        status.as_str().to_owned()
    }
}

impl std::fmt::Display for WorkEffortStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TicketStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Other(String),
}

impl TicketStatus {
    pub fn parse(raw: &str) -> Self {
        match normalize(raw).as_str() {
            "pending" => Self::Pending,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "blocked" => Self::Blocked,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Other(s) => s,
        }
    }
}

impl Default for TicketStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl From<String> for TicketStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<TicketStatus> for String {
    fn from(status: TicketStatus) -> Self {
        status.as_str().to_owned()
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-case underscore form used for all status bucketing.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '-'], "_")
}
