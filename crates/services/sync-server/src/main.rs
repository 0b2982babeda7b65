//! WatchParty sync server binary
//!
//! # Usage
//!
//! ```bash
//! # Defaults (0.0.0.0:8080, SQLite at ./watchparty.db)
//! cargo run -p watchparty-sync-server
//!
//! # From a config file, overriding the port
//! cargo run -p watchparty-sync-server -- --config watchparty.toml --port 9090
//!
//! # With logging
//! RUST_LOG=debug cargo run -p watchparty-sync-server
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watchparty_core::SystemClock;

use watchparty_sync_server::{
    api::{build_router, AppState},
    config::Config,
    engine::SyncEngine,
    metrics::global_metrics,
    storage::open_repository,
};

#[derive(Debug, Parser)]
#[command(name = "sync-server", version, about = "WatchParty sync server")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "WATCHPARTY_CONFIG")]
    config: Option<PathBuf>,

    /// Bind host (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// HTTP / WebSocket port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_ref()).context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.http_port = port;
    }
    let config = Arc::new(config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind_addr(),
        backend = ?config.storage.backend,
        "Starting WatchParty sync server"
    );

    let metrics = global_metrics();
    let repository = open_repository(&config.storage, metrics.clone())
        .context("Failed to open session store")?;

    let (engine, engine_task) = SyncEngine::new(repository, Arc::new(SystemClock), metrics.clone())
        .spawn(config.sync.command_queue_capacity);

    let state = AppState::new(engine.clone(), config.clone(), metrics);
    let router = build_router(state);

    let listener = TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr()))?;
    tracing::info!("HTTP server listening on {}", config.bind_addr());

    // Stopping the engine closes every outbound queue, which in turn closes
    // the open WebSockets so the server can drain.
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, initiating graceful shutdown...");
            if let Err(e) = engine.shutdown().await {
                tracing::warn!(error = %e, "Engine already stopped");
            }
        })
        .await?;

    let _ = engine_task.await;

    tracing::info!("WatchParty sync server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
