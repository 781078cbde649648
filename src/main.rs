//! Portal request proxy.
//!
//! ```text
//!     Browser (session cookie)
//!         │
//!         ▼
//!   ┌───────────────────────────────────────────────────────────────┐
//!   │ request id → trace → rate limit → client signal → handler     │
//!   │                                                               │
//!   │  handler: session → abort bridge → build → fetch → relay      │
//!   └───────────────┬───────────────────────────────┬───────────────┘
//!                   │ /api/proxy/*                  │ /api/graphql
//!                   ▼                               ▼
//!             Control plane API               GraphQL gateway
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use portal_proxy::config::loader::{load_config, load_from_env};
use portal_proxy::config::watcher::ConfigWatcher;
use portal_proxy::lifecycle::{build_server, signals, Shutdown};
use portal_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "portal-proxy")]
#[command(about = "Authenticated request proxy for the portal", long_about = None)]
struct Args {
    /// TOML configuration file; defaults plus environment when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "portal-proxy starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        control_plane = %config.upstream.control_plane_url,
        graphql = %config.upstream.graphql_url,
        rate_limit = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the life of the process.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let bind_address = config.listener.bind_address.clone();
    let server = build_server(config).await?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match signals::wait_for_signal().await {
            Ok(()) => trigger.trigger(),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signals"),
        }
    });

    server.run(listener, config_updates, shutdown.token()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
