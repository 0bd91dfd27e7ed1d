//! Occupancy ledger store abstraction.
//!
//! The store is the system of record. Writes are partial upserts keyed by
//! spot identifier; reads are whole snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::Result;
use crate::patch::SpotPatch;
use crate::record::{SpotId, SpotRecord};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Every persisted record. Order carries no meaning.
    async fn get_all(&self) -> Result<Vec<SpotRecord>>;

    /// Merge `patch` into the record for `patch.id`, creating a FREE record
    /// first if none exists. Atomic per key.
    async fn upsert(&self, patch: &SpotPatch) -> Result<()>;
}

#[async_trait]
impl<T: LedgerStore + ?Sized> LedgerStore for Arc<T> {
    async fn get_all(&self) -> Result<Vec<SpotRecord>> {
        (**self).get_all().await
    }

    async fn upsert(&self, patch: &SpotPatch) -> Result<()> {
        (**self).upsert(patch).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryInner {
    records: BTreeMap<SpotId, SpotRecord>,
    next_key: u64,
}

/// Process-local store for tests and offline use.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get_all(&self) -> Result<Vec<SpotRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.records.values().cloned().collect())
    }

    async fn upsert(&self, patch: &SpotPatch) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let MemoryInner { records, next_key } = &mut *inner;

        let record = records.entry(patch.id.clone()).or_insert_with(|| {
            *next_key += 1;
            let mut fresh = SpotRecord::free(patch.id.clone());
            fresh.store_key = Some(next_key.to_string());
            fresh
        });
        patch.apply_to(record);

        tracing::debug!(spot = %patch.id, "memory store upsert");
        Ok(())
    }
}
