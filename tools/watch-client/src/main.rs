//! WatchParty terminal client
//!
//! Creates and inspects sessions over the bootstrap API and joins them as an
//! interactive viewer backed by a simulated player.
//!
//! # Usage
//!
//! ```bash
//! # Create a session
//! watch-client create --session movie-night --video https://youtu.be/dQw4w9WgXcQ
//!
//! # Inspect it
//! watch-client show --session movie-night
//!
//! # Join it (type `join`, then `play`, `pause`, `seek 90`, ...)
//! watch-client -v watch --session movie-night
//! ```

mod player;
mod watch;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// WatchParty terminal client
#[derive(Parser)]
#[command(name = "watch-client")]
#[command(author, version)]
#[command(about = "Create, inspect and join WatchParty sessions from a terminal")]
struct Args {
    /// Sync server base URL
    #[arg(long, env = "WATCHPARTY_SERVER", default_value = "http://127.0.0.1:8080", global = true)]
    server: String,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new session
    Create {
        #[arg(short, long)]
        session: String,

        /// Video reference, e.g. a YouTube URL
        #[arg(long)]
        video: String,
    },
    /// Print a session's current record
    Show {
        #[arg(short, long)]
        session: String,
    },
    /// Join a session as an interactive viewer
    Watch {
        #[arg(short, long)]
        session: String,

        /// Progress tick interval in milliseconds
        #[arg(long, default_value_t = 250)]
        tick_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let base = args.server.trim_end_matches('/');
    match args.command {
        Command::Create { session, video } => {
            let client = reqwest::Client::new();
            let response = client
                .post(format!("{}/api/sessions", base))
                .json(&json!({ "sessionId": session, "videoSource": video }))
                .send()
                .await
                .context("Failed to reach the sync server")?;
            print_response(response).await?;
        }
        Command::Show { session } => {
            let response = reqwest::get(format!("{}/api/sessions/{}", base, session))
                .await
                .context("Failed to reach the sync server")?;
            print_response(response).await?;
        }
        Command::Watch { session, tick_ms } => {
            let url = ws_url(base)?;
            watch::run(&url, &session, Duration::from_millis(tick_ms.max(10))).await?;
        }
    }

    Ok(())
}

async fn print_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    let body: Value = response.json().await.context("Unreadable response body")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        bail!("server answered {}", status);
    }
    Ok(())
}

/// WebSocket endpoint for an HTTP base URL
fn ws_url(base: &str) -> Result<String> {
    let rest = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        bail!("unsupported server URL '{}'", base);
    };
    Ok(format!("{}/ws", rest))
}
