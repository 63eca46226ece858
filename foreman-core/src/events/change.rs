//! Snapshot differ: classifies the delta between two repository
//! snapshots into typed domain events.

use std::collections::HashMap;

use foreman_model::{
    DomainEvent, RepoState, Ticket, TicketStatus, WorkEffort,
    WorkEffortStatus,
};

/// Diff a prior snapshot against the current one.
///
/// Pure: reads the two snapshots and produces an ordered event
/// sequence, never touching repository state. With no prior snapshot
/// the current state is the baseline and nothing is emitted; replaying
/// a creation flood for every pre-existing record on startup would be
/// noise, so only deltas after the first parse produce events.
pub fn detect_changes(
    repo: &str,
    prior: Option<&RepoState>,
    current: &RepoState,
) -> Vec<DomainEvent> {
    let Some(prior) = prior else {
        return Vec::new();
    };

    let prev_by_id: HashMap<&str, &WorkEffort> = prior
        .work_efforts
        .iter()
        .map(|we| (we.id.as_str(), we))
        .collect();

    let mut events = Vec::new();

    for we in &current.work_efforts {
        match prev_by_id.get(we.id.as_str()) {
            None => events.push(DomainEvent::WorkEffortCreated {
                repo: repo.to_owned(),
                we: we.clone(),
            }),
            Some(prev) => {
                if prev.status != we.status {
                    events.push(classify_work_effort_transition(
                        repo, prev, we,
                    ));
                }
                diff_tickets(repo, prev, we, &mut events);
            }
        }
        if !prev_by_id.contains_key(we.id.as_str()) {
            // New work efforts announce their tickets too.
            for ticket in &we.tickets {
                events.push(DomainEvent::TicketCreated {
                    repo: repo.to_owned(),
                    ticket: ticket.clone(),
                });
            }
        }
    }

    events
}

/// Transition kind is chosen by the *new* status.
fn classify_work_effort_transition(
    repo: &str,
    prev: &WorkEffort,
    curr: &WorkEffort,
) -> DomainEvent {
    let repo = repo.to_owned();
    let old_status = prev.status.as_str().to_owned();
    let we = curr.clone();
    match &curr.status {
        WorkEffortStatus::Completed => DomainEvent::WorkEffortCompleted {
            repo,
            old_status,
            we,
        },
        WorkEffortStatus::Active | WorkEffortStatus::InProgress => {
            DomainEvent::WorkEffortStarted {
                repo,
                old_status,
                we,
            }
        }
        WorkEffortStatus::Paused => DomainEvent::WorkEffortPaused {
            repo,
            old_status,
            we,
        },
        _ => DomainEvent::WorkEffortUpdated {
            repo,
            old_status,
            we,
        },
    }
}

fn diff_tickets(
    repo: &str,
    prev: &WorkEffort,
    curr: &WorkEffort,
    events: &mut Vec<DomainEvent>,
) {
    let prev_by_id: HashMap<&str, &Ticket> = prev
        .tickets
        .iter()
        .map(|t| (t.id.as_str(), t))
        .collect();

    for ticket in &curr.tickets {
        match prev_by_id.get(ticket.id.as_str()) {
            None => events.push(DomainEvent::TicketCreated {
                repo: repo.to_owned(),
                ticket: ticket.clone(),
            }),
            Some(old) if old.status != ticket.status => {
                let repo = repo.to_owned();
                let old_status = old.status.as_str().to_owned();
                let ticket = ticket.clone();
                events.push(match ticket.status {
                    TicketStatus::Completed => {
                        DomainEvent::TicketCompleted {
                            repo,
                            old_status,
                            ticket,
                        }
                    }
                    TicketStatus::Blocked => DomainEvent::TicketBlocked {
                        repo,
                        old_status,
                        ticket,
                    },
                    _ => DomainEvent::TicketUpdated {
                        repo,
                        old_status,
                        ticket,
                    },
                });
            }
            Some(_) => {}
        }
    }
}
