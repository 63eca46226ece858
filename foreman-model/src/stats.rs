use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::ArtifactFormat;
use crate::work_effort::WorkEffort;

/// Work effort counts broken down by artifact family.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct FormatCounts {
    pub mcp: usize,
    pub jd: usize,
}

/// Aggregate statistics over one repository's work efforts.
///
/// Always derivable from the record list; recomputed in full on every
/// refresh and never patched incrementally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStats {
    pub total: usize,
    pub by_format: FormatCounts,
    pub by_status: BTreeMap<String, usize>,
    pub total_tickets: usize,
    pub tickets_by_status: BTreeMap<String, usize>,
}

impl RepoStats {
    /// Single linear pass over the record list.
    pub fn collect(work_efforts: &[WorkEffort]) -> Self {
        let mut stats = Self {
            total: work_efforts.len(),
            ..Self::default()
        };

        for we in work_efforts {
            match we.format {
                ArtifactFormat::Mcp => stats.by_format.mcp += 1,
                ArtifactFormat::Jd => stats.by_format.jd += 1,
            }
            *stats
                .by_status
                .entry(we.status.as_str().to_owned())
                .or_default() += 1;

            stats.total_tickets += we.tickets.len();
            for ticket in &we.tickets {
                *stats
                    .tickets_by_status
                    .entry(ticket.status.as_str().to_owned())
                    .or_default() += 1;
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::ids::{TicketId, WorkEffortId};
    use crate::status::{TicketStatus, WorkEffortStatus};
    use crate::work_effort::Ticket;

    fn we(id: &str, status: &str, tickets: Vec<Ticket>) -> WorkEffort {
        let id = WorkEffortId::unchecked(id);
        WorkEffort {
            format: id.format(),
            id,
            title: "t".into(),
            status: WorkEffortStatus::parse(status),
            created: None,
            last_updated: None,
            repository: None,
            branch: None,
            category: None,
            tickets,
            path: PathBuf::from("/tmp/x.md"),
            error: None,
        }
    }

    fn tkt(id: &str, parent: &str, status: &str) -> Ticket {
        Ticket {
            id: TicketId::unchecked(id),
            title: "t".into(),
            status: TicketStatus::parse(status),
            parent: WorkEffortId::unchecked(parent),
            created: None,
            assigned_to: None,
            path: PathBuf::from("/tmp/t.md"),
            error: None,
        }
    }

    #[test]
    fn totals_match_input_length() {
        let ws = vec![
            we("WE-260501-ab12", "active", vec![]),
            we("WE-260502-cd34", "completed", vec![]),
            we("10.01", "active", vec![]),
        ];
        let stats = RepoStats::collect(&ws);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_format.mcp, 2);
        assert_eq!(stats.by_format.jd, 1);
        assert_eq!(
            stats.by_status.values().sum::<usize>(),
            stats.total
        );
    }

    #[test]
    fn ticket_aggregates_sum_up() {
        let ws = vec![we(
            "WE-260501-ab12",
            "active",
            vec![
                tkt("TKT-ab12-001", "WE-260501-ab12", "pending"),
                tkt("TKT-ab12-002", "WE-260501-ab12", "completed"),
                tkt("TKT-ab12-003", "WE-260501-ab12", "pending"),
            ],
        )];
        let stats = RepoStats::collect(&ws);
        assert_eq!(stats.total_tickets, 3);
        assert_eq!(stats.tickets_by_status["pending"], 2);
        assert_eq!(
            stats.tickets_by_status.values().sum::<usize>(),
            stats.total_tickets
        );
    }

    #[test]
    fn empty_input_yields_zeroed_stats() {
        let stats = RepoStats::collect(&[]);
        assert_eq!(stats, RepoStats::default());
    }
}
