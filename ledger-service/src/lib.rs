//! `parking-ledger-service`: system of record for the parking ledger.
//!
//! Serves the ledger over HTTP from a SQLite database, and ships the HTTP
//! client that lets callers use the service as a [`LedgerStore`].
//!
//! [`LedgerStore`]: parking_core::LedgerStore

pub mod client;
pub mod http;
pub mod persistence;

use std::future::Future;

use tokio::net::TcpListener;

pub use client::HttpLedgerClient;
pub use http::{AppState, HttpApiError, router};
pub use persistence::SqliteLedgerStore;

/// Serve the ledger API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "ledger service listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
