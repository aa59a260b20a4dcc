use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod error;
mod presence;
mod protocol;
mod server;
mod service;
mod store;
mod tasks;
mod ws;

use crate::auth::TokenVerifier;
use crate::server::RelayServer;
use crate::store::MemoryStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "lingo-relay, real-time relay for the LingoLink platform", long_about = None)]
struct Args {
    /// Config file path (TOML); RELAY_* environment variables override.
    #[arg(short = 'c', long = "config", default_value = "config/default.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = config::Settings::load(&args.config)?;
    if settings.auth.jwt_secret == "insecure-dev-secret" {
        warn!("⚠️  Running with the default JWT secret; set RELAY_AUTH__JWT_SECRET");
    }

    // Development store; production deployments wire the platform's
    // document database behind the same RelayStore seam.
    let store = Arc::new(MemoryStore::new());
    let server = RelayServer::new(store, TokenVerifier::new(settings.auth.jwt_secret.as_bytes()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tasks::reaper::spawn_reaper(
        server.clone(),
        Duration::from_secs(settings.reaper.interval_secs),
        shutdown_rx,
    );

    tokio::select! {
        result = server.run(&settings.server.host, settings.server.port) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping");
            let _ = shutdown_tx.send(true);
        }
    }
    Ok(())
}
