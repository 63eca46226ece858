use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use foreman_config::ConfigStore;
use foreman_core::counter::CounterService;
use foreman_core::events::EventBus;
use foreman_core::RepoRegistry;
use foreman_server::routes::create_api_router;
use foreman_server::websocket::ClientRegistry;
use foreman_server::AppState;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long shutdown may spend draining watchers and sessions.
const SHUTDOWN_CEILING: Duration = Duration::from_secs(5);

/// Command line arguments for the Foreman server
#[derive(Parser, Debug)]
#[command(name = "foreman-server")]
#[command(about = "Mission-control server for work-effort repositories")]
struct Args {
    /// Path to the config.json document
    #[arg(long, env = "FOREMAN_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Static asset directory to watch for hot reload
    #[cfg(feature = "hot-reload")]
    #[arg(long, env = "FOREMAN_ASSETS_DIR")]
    assets: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "foreman_server=debug,foreman_core=debug,tower_http=debug"
                        .into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A malformed config is fatal; a missing one starts empty.
    let store = ConfigStore::load(&args.config)?;
    let config = store.config().clone();
    info!(
        path = %args.config.display(),
        repos = config.repos.len(),
        "configuration loaded"
    );

    let port = args.port.unwrap_or(config.port);
    let host = args.host.unwrap_or_else(|| config.host.clone());
    let browse_root = config.browse_root.clone();

    // Counter state lives beside the config document.
    let counter_path = args
        .config
        .parent()
        .map(|dir| dir.join("counter-state.json"))
        .unwrap_or_else(|| PathBuf::from("counter-state.json"));
    let counters = Arc::new(CounterService::load(counter_path)?);

    let bus = EventBus::new();
    let registry = RepoRegistry::new(store, bus);
    registry.init().await?;

    let clients = Arc::new(ClientRegistry::new());

    // Fan registry frames out to connected sessions.
    {
        let clients = Arc::clone(&clients);
        let mut frames = registry.subscribe_frames();
        tokio::spawn(async move {
            loop {
                match frames.recv().await {
                    Ok(frame) => clients.broadcast(frame).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(
                        skipped,
                    )) => {
                        warn!(skipped, "frame fan-out lagging");
                    }
                    Err(_) => break,
                }
            }
        });
    }

    #[cfg(feature = "hot-reload")]
    let _asset_watcher = match &args.assets {
        Some(dir) => {
            Some(foreman_server::dev::watch_assets(
                dir,
                registry.frame_sender(),
            )?)
        }
        None => None,
    };

    let state = AppState::new(
        Arc::clone(&registry),
        counters,
        Arc::clone(&clients),
        browse_root,
    );
    let app = create_api_router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("Starting Foreman server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("draining watchers and client sessions");
    let drained = tokio::time::timeout(SHUTDOWN_CEILING, async {
        registry.shutdown().await;
        clients.close_all();
    })
    .await;

    if drained.is_err() {
        anyhow::bail!(
            "shutdown did not drain within {SHUTDOWN_CEILING:?}"
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for shutdown signal");
    }
}
