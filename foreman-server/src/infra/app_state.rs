use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use foreman_core::counter::CounterService;
use foreman_core::RepoRegistry;

use crate::websocket::ClientRegistry;

// Server application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RepoRegistry>,
    pub counters: Arc<CounterService>,
    pub clients: Arc<ClientRegistry>,
    pub started_at: Instant,
    /// Root the browse endpoint refuses to escape.
    pub browse_root: PathBuf,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("registry", &self.registry)
            .field("client_count", &self.clients.count())
            .field("browse_root", &self.browse_root)
            .finish()
    }
}

impl AppState {
    pub fn new(
        registry: Arc<RepoRegistry>,
        counters: Arc<CounterService>,
        clients: Arc<ClientRegistry>,
        browse_root: PathBuf,
    ) -> Self {
        Self {
            registry,
            counters,
            clients,
            started_at: Instant::now(),
            browse_root,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
