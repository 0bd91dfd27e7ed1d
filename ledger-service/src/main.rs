//! `parking-ledger-server` entry point.
//!
//! Opens the SQLite ledger and serves it over HTTP until Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use parking_core::ParkingConfig;
use parking_ledger_service::{AppState, SqliteLedgerStore};

#[derive(Debug, Parser)]
#[command(name = "parking-ledger-server", version, about = "Parking ledger HTTP service")]
struct Args {
    /// Config file (defaults to $PARKING_LEDGER_CONFIG or ~/.config/parking-ledger/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overrides `server.bind`
    #[arg(long)]
    bind: Option<String>,

    /// Database file, overrides `store.db_path`
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!("parking-ledger-server v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => ParkingConfig::load_from_path(path),
        None => ParkingConfig::load(),
    }
    .context("loading configuration")?;

    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| config.store.resolved_db_path());
    let store = SqliteLedgerStore::open(&db_path)
        .with_context(|| format!("opening ledger db at {}", db_path.display()))?;
    tracing::info!("ledger db at {}", db_path.display());

    let bind = args.bind.unwrap_or(config.server.bind);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;

    let state = AppState::new(Arc::new(store), config.registry.enforce);
    parking_ledger_service::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("signal received, shutting down");
    })
    .await
    .context("serving ledger API")?;

    tracing::info!("parking-ledger-server exiting cleanly");
    Ok(())
}
