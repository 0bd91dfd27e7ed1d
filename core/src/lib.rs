//! Occupancy and payment ledger for a fixed set of parking spots.
//!
//! - `registry`: the static floor plan
//! - `record` / `patch`: the persisted record and partial updates to it
//! - `state`: validated transitions (occupy, release, payment, edit)
//! - `store`: the system-of-record abstraction plus an in-memory store
//! - `sync`: optimistic local working copy with bounded-retry commits

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod errors;
pub mod patch;
pub mod record;
pub mod registry;
pub mod retry;
pub mod state;
pub mod store;
pub mod sync;

pub use config::ParkingConfig;
pub use errors::{ErrorCategory, LedgerError, Result};
pub use patch::SpotPatch;
pub use record::{Month, Payments, SpotId, SpotRecord, SpotStatus};
pub use registry::{SpotCategory, Zone};
pub use state::{InfoUpdate, SpotStateService, Transition};
pub use store::{LedgerStore, MemoryLedgerStore};
pub use sync::{SyncController, WriteFailurePolicy};

/// Crate version, reported by the health endpoint
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
