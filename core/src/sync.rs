//! Caller-side working copy of the ledger.
//!
//! Holds the last loaded snapshot, applies state transitions optimistically
//! and persists their patches through the store with bounded retry. The local
//! map lock is only held for map updates, never across a store call, so
//! operators on different spots never wait on each other.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::{ParkingConfig, SyncConfig};
use crate::errors::{LedgerError, Result};
use crate::patch::SpotPatch;
use crate::record::{SpotId, SpotRecord};
use crate::retry::{self, RetryConfig};
use crate::state::{InfoUpdate, SpotStateService, Transition};
use crate::store::LedgerStore;

/// What happens to an optimistic update whose commit failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteFailurePolicy {
    /// Keep the optimistic record and flag reconciliation. Other spots are
    /// refreshed from the store.
    #[default]
    FailOpen,
    /// Restore the record that was there before.
    FailClosed,
}

#[derive(Debug, Default)]
struct LocalLedger {
    records: HashMap<SpotId, SpotRecord>,
    loaded_at: Option<Instant>,
    needs_reconcile: bool,
    /// Spots whose local record is ahead of the store after a failed commit.
    pending: HashSet<SpotId>,
}

pub struct SyncController<S: LedgerStore> {
    store: Arc<S>,
    state: SpotStateService,
    config: SyncConfig,
    local: Arc<Mutex<LocalLedger>>,
}

impl<S: LedgerStore + 'static> SyncController<S> {
    pub fn new(store: Arc<S>, state: SpotStateService, config: SyncConfig) -> Self {
        Self {
            store,
            state,
            config,
            local: Arc::new(Mutex::new(LocalLedger::default())),
        }
    }

    pub fn from_config(store: Arc<S>, config: &ParkingConfig) -> Self {
        Self::new(
            store,
            SpotStateService::new(config.registry.enforce),
            config.sync.clone(),
        )
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn policy(&self) -> WriteFailurePolicy {
        self.config.write_failure_policy
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Fetch the full snapshot and replace the local map with it. This is the
    /// reconciliation point: records kept after failed commits are dropped in
    /// favour of the store's.
    pub async fn load(&self) -> Result<HashMap<SpotId, SpotRecord>> {
        let map = self.fetch().await?;

        let mut local = self.local.lock().await;
        local.records = map.clone();
        local.loaded_at = Some(Instant::now());
        local.needs_reconcile = false;
        local.pending.clear();
        tracing::debug!(count = map.len(), "loaded ledger snapshot");
        Ok(map)
    }

    /// Spots whose local record has not reached the store, in identifier order.
    pub async fn pending(&self) -> Vec<SpotId> {
        let local = self.local.lock().await;
        let mut ids: Vec<SpotId> = local.pending.iter().cloned().collect();
        ids.sort();
        ids
    }

    async fn fetch(&self) -> Result<HashMap<SpotId, SpotRecord>> {
        let records = retry::with_backoff(|| self.store.get_all(), &self.config.retry).await?;
        Ok(records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect())
    }

    /// Refresh from the store without touching pending spots.
    async fn refresh_keeping_pending(&self) -> Result<()> {
        let mut fresh = self.fetch().await?;

        let mut local = self.local.lock().await;
        for id in &local.pending {
            if let Some(record) = local.records.get(id) {
                fresh.insert(id.clone(), record.clone());
            }
        }
        local.records = fresh;
        local.loaded_at = Some(Instant::now());
        tracing::debug!(pending = local.pending.len(), "refreshed around pending spots");
        Ok(())
    }

    /// Local copy in identifier order.
    pub async fn snapshot(&self) -> Vec<SpotRecord> {
        let local = self.local.lock().await;
        let mut records: Vec<SpotRecord> = local.records.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Local record for `id`; an unseen spot reads as FREE.
    pub async fn get(&self, id: &SpotId) -> SpotRecord {
        let local = self.local.lock().await;
        local
            .records
            .get(id)
            .cloned()
            .unwrap_or_else(|| SpotRecord::free(id.clone()))
    }

    /// True when a commit failed and no `load()` has run since.
    pub async fn needs_reconcile(&self) -> bool {
        self.local.lock().await.needs_reconcile
    }

    /// The local copy may lag the store by up to `sync.stale_after_secs`
    /// after a load; past that, or while reconciliation is pending, it is
    /// stale.
    pub async fn is_stale(&self) -> bool {
        let window = Duration::from_secs(self.config.stale_after_secs);
        let local = self.local.lock().await;
        local.needs_reconcile || local.loaded_at.is_none_or(|at| at.elapsed() >= window)
    }

    // ── Writes ──────────────────────────────────────────────────────────

    /// Put `record` into the local map ahead of its commit. Returns what was
    /// there before.
    pub async fn apply_optimistic(&self, record: SpotRecord) -> Option<SpotRecord> {
        let mut local = self.local.lock().await;
        local.records.insert(record.id.clone(), record)
    }

    /// Persist `patch` with bounded retry.
    pub async fn commit(&self, patch: &SpotPatch) -> Result<()> {
        commit_with_retry(self.store.as_ref(), patch, &self.config.retry).await
    }

    /// Fire-and-forget commit. A failure flags reconciliation.
    pub fn spawn_commit(&self, patch: SpotPatch) -> JoinHandle<Result<()>> {
        let store = self.store.clone();
        let retry = self.config.retry.clone();
        let local = self.local.clone();
        tokio::spawn(async move {
            let result = commit_with_retry(store.as_ref(), &patch, &retry).await;
            if result.is_err() {
                let mut local = local.lock().await;
                local.needs_reconcile = true;
                local.pending.insert(patch.id.clone());
            }
            result
        })
    }

    pub async fn occupy(
        &self,
        id: &SpotId,
        tenant_name: &str,
        plate: &str,
        phone: &str,
    ) -> Result<SpotRecord> {
        let current = self.get(id).await;
        let transition = self.state.occupy(&current, tenant_name, plate, phone)?;
        self.apply(transition).await
    }

    pub async fn release(&self, id: &SpotId) -> Result<SpotRecord> {
        let current = self.get(id).await;
        let transition = self.state.release(&current)?;
        self.apply(transition).await
    }

    pub async fn record_payment(
        &self,
        id: &SpotId,
        year: &str,
        month: &str,
        note: &str,
    ) -> Result<SpotRecord> {
        let current = self.get(id).await;
        let transition = self.state.record_payment(&current, year, month, note)?;
        self.apply(transition).await
    }

    pub async fn update_info(&self, id: &SpotId, update: &InfoUpdate) -> Result<SpotRecord> {
        let current = self.get(id).await;
        let transition = self.state.update_info(&current, update)?;
        self.apply(transition).await
    }

    async fn apply(&self, transition: Transition) -> Result<SpotRecord> {
        let Transition { record, patch } = transition;
        let previous = self.apply_optimistic(record.clone()).await;

        match self.commit(&patch).await {
            Ok(()) => Ok(record),
            Err(err) => Err(self.on_write_failure(&record.id, previous, err).await),
        }
    }

    async fn on_write_failure(
        &self,
        id: &SpotId,
        previous: Option<SpotRecord>,
        err: LedgerError,
    ) -> LedgerError {
        match self.config.write_failure_policy {
            WriteFailurePolicy::FailOpen => {
                {
                    let mut local = self.local.lock().await;
                    local.needs_reconcile = true;
                    local.pending.insert(id.clone());
                }
                tracing::warn!(
                    spot = %id,
                    error = %err,
                    category = err.category().as_str(),
                    "commit failed, keeping optimistic record"
                );
                if let Err(load_err) = self.refresh_keeping_pending().await {
                    tracing::warn!(error = %load_err, "refresh after failed commit failed");
                }
            }
            WriteFailurePolicy::FailClosed => {
                let mut local = self.local.lock().await;
                match previous {
                    Some(record) => {
                        local.records.insert(id.clone(), record);
                    }
                    None => {
                        local.records.remove(id);
                    }
                }
                tracing::warn!(
                    spot = %id,
                    error = %err,
                    category = err.category().as_str(),
                    "commit failed, restored previous record"
                );
            }
        }
        err
    }
}

async fn commit_with_retry<S: LedgerStore + ?Sized>(
    store: &S,
    patch: &SpotPatch,
    retry: &RetryConfig,
) -> Result<()> {
    retry::with_backoff(|| store.upsert(patch), retry).await?;
    tracing::debug!(spot = %patch.id, "committed patch");
    Ok(())
}
