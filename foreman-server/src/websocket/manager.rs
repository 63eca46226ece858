use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use foreman_model::ServerFrame;
use tracing::{debug, warn};
use uuid::Uuid;

use super::connection::{ClientSession, SendError};

/// Active client session set.
///
/// Fan-out iterates a snapshot of the set so no lock is held across
/// sends; one slow or dead client never blocks the others.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    sessions: Arc<DashMap<Uuid, ClientSession>>,
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("session_count", &self.sessions.len())
            .finish()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session.
    pub fn add(&self, session: ClientSession) {
        debug!(session = %session.id, "client connected");
        self.sessions.insert(session.id, session);
    }

    /// Remove a session.
    pub fn remove(&self, id: Uuid) {
        if self.sessions.remove(&id).is_some() {
            debug!(session = %id, "client disconnected");
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Fan a frame out to every active session. Send failures close the
    /// offending session only and never abort the loop.
    pub async fn broadcast(&self, frame: ServerFrame) {
        let snapshot: Vec<ClientSession> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for session in snapshot {
            if let Err(SendError::Closed) =
                session.send(frame.clone()).await
            {
                warn!(session = %session.id, "dropping closed session");
                self.remove(session.id);
            }
        }
    }

    /// Drop every session; their socket pumps observe the closed
    /// queues and finish.
    pub fn close_all(&self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_model::RepoState;

    fn update_frame(repo: &str) -> ServerFrame {
        ServerFrame::update(repo, &RepoState::new(Vec::new(), None))
    }

    #[tokio::test]
    async fn broadcast_reaches_all_sessions() {
        let registry = ClientRegistry::new();
        let (a, mut rx_a) = ClientSession::new();
        let (b, mut rx_b) = ClientSession::new();
        registry.add(a);
        registry.add(b);

        registry.broadcast(update_frame("_pyrite")).await;
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dead_session_does_not_block_others() {
        let registry = ClientRegistry::new();
        let (alive, mut rx_alive) = ClientSession::new();
        let (dead, rx_dead) = ClientSession::new();
        registry.add(alive);
        registry.add(dead);
        drop(rx_dead);

        registry.broadcast(update_frame("_pyrite")).await;
        assert!(rx_alive.try_recv().is_ok());
        // The dead session was removed from the active set.
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn saturated_session_is_kept_but_skipped() {
        let registry = ClientRegistry::new();
        let (slow, mut rx_slow) = ClientSession::new();
        let (fast, mut rx_fast) = ClientSession::new();
        registry.add(slow.clone());
        registry.add(fast);

        // Fill the slow client's queue without draining it.
        for i in 0..super::super::connection::SEND_BUFFER {
            slow.send(update_frame(&format!("r{i}"))).await.unwrap();
        }

        registry.broadcast(update_frame("_pyrite")).await;

        // The fast client still got the update.
        assert!(rx_fast.try_recv().is_ok());
        // The slow client's queue holds only its earlier frames.
        let mut drained = 0;
        while rx_slow.try_recv().is_ok() {
            drained += 1;
        }
        assert_eq!(drained, super::super::connection::SEND_BUFFER);
        assert_eq!(registry.count(), 2);
    }
}
