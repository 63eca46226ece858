use crate::error::ModelError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `WE-YYMMDD-xxxx` where `xxxx` is a 4-character base-36 suffix.
pub static WORK_EFFORT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^WE-(\d{6})-([a-z0-9]{4})$").unwrap());

/// Legacy Johnny Decimal codes such as `10.01`.
pub static JOHNNY_DECIMAL_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}\.\d{1,2}$").unwrap());

/// `TKT-xxxx-NNN` where `xxxx` matches the parent work effort's suffix.
pub static TICKET_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^TKT-([a-z0-9]{4})-(\d{3})$").unwrap());

/// `CKPT-YYMMDD-HHMM` session journal identifiers.
pub static CHECKPOINT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^CKPT-(\d{6})-(\d{4})$").unwrap());

/// Artifact family a work effort was parsed from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    /// Directory-per-work-effort layout with an `_index.md` and tickets.
    Mcp,
    /// Legacy Johnny Decimal flat markdown files.
    Jd,
}

impl std::fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactFormat::Mcp => f.write_str("mcp"),
            ArtifactFormat::Jd => f.write_str("jd"),
        }
    }
}

/// Strongly typed work effort identifier.
///
/// Holds either the current `WE-YYMMDD-xxxx` form or a legacy Johnny
/// Decimal numeric code. Opaque and stable after creation; ordering and
/// equality are plain string semantics.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct WorkEffortId(String);

impl WorkEffortId {
    /// Validate and wrap an identifier in either supported form.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        if WORK_EFFORT_ID_RE.is_match(raw)
            || JOHNNY_DECIMAL_ID_RE.is_match(raw)
        {
            Ok(Self(raw.to_owned()))
        } else {
            Err(ModelError::InvalidId(format!(
                "not a work effort id: {raw}"
            )))
        }
    }

    /// Wrap without validation. Used by the parser for records salvaged
    /// from malformed files, where the id is whatever the file claims.
    pub fn unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn format(&self) -> ArtifactFormat {
        if JOHNNY_DECIMAL_ID_RE.is_match(&self.0) {
            ArtifactFormat::Jd
        } else {
            ArtifactFormat::Mcp
        }
    }

    /// The 4-character suffix of an MCP id, `None` for Johnny Decimal.
    pub fn suffix(&self) -> Option<&str> {
        WORK_EFFORT_ID_RE
            .captures(&self.0)
            .and_then(|c| c.get(2))
            .map(|m| m.as_str())
    }

    /// The `YYMMDD` creation-date component of an MCP id.
    pub fn date_component(&self) -> Option<&str> {
        WORK_EFFORT_ID_RE
            .captures(&self.0)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkEffortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorkEffortId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strongly typed ticket identifier, `TKT-xxxx-NNN`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        if TICKET_ID_RE.is_match(raw) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(ModelError::InvalidId(format!("not a ticket id: {raw}")))
        }
    }

    pub fn unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The parent work effort's 4-character suffix.
    pub fn parent_suffix(&self) -> Option<&str> {
        TICKET_ID_RE
            .captures(&self.0)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Zero-padded sequence number unique within the parent.
    pub fn sequence(&self) -> Option<u32> {
        TICKET_ID_RE
            .captures(&self.0)
            .and_then(|c| c.get(2))
            .and_then(|m| m.as_str().parse().ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// `CKPT-YYMMDD-HHMM` checkpoint identifier. Counted, never parsed into
/// a structured entity.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct CheckpointId(String);

impl CheckpointId {
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        if CHECKPOINT_ID_RE.is_match(raw) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(ModelError::InvalidId(format!(
                "not a checkpoint id: {raw}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mcp_work_effort_ids() {
        let id = WorkEffortId::parse("WE-260501-ab12").unwrap();
        assert_eq!(id.format(), ArtifactFormat::Mcp);
        assert_eq!(id.suffix(), Some("ab12"));
        assert_eq!(id.date_component(), Some("260501"));
    }

    #[test]
    fn parses_johnny_decimal_ids() {
        let id = WorkEffortId::parse("10.01").unwrap();
        assert_eq!(id.format(), ArtifactFormat::Jd);
        assert_eq!(id.suffix(), None);
    }

    #[test]
    fn rejects_malformed_work_effort_ids() {
        assert!(WorkEffortId::parse("WE-2605-ab12").is_err());
        assert!(WorkEffortId::parse("WE-260501-AB12").is_err());
        assert!(WorkEffortId::parse("work-effort").is_err());
    }

    #[test]
    fn ticket_id_components() {
        let id = TicketId::parse("TKT-ab12-003").unwrap();
        assert_eq!(id.parent_suffix(), Some("ab12"));
        assert_eq!(id.sequence(), Some(3));
        assert!(TicketId::parse("TKT-ab12-3").is_err());
    }

    #[test]
    fn checkpoint_id_round_trip() {
        let id = CheckpointId::parse("CKPT-260501-0930").unwrap();
        assert_eq!(id.as_str(), "CKPT-260501-0930");
        assert!(CheckpointId::parse("CKPT-260501-93").is_err());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = WorkEffortId::parse("WE-260501-ab12").unwrap();
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"WE-260501-ab12\""
        );
    }
}
