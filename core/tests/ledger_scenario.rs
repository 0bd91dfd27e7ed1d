#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end ledger flows against the in-memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_core::config::SyncConfig;
use parking_core::retry::RetryConfig;
use parking_core::{
    InfoUpdate, LedgerError, LedgerStore, MemoryLedgerStore, Month, SpotId, SpotPatch,
    SpotRecord, SpotStateService, SpotStatus, SyncController, WriteFailurePolicy,
};
use pretty_assertions::assert_eq;

const ENTRY: &str = "2025-01-10T09:30:00.000Z";

/// Memory store whose reads and writes can be switched off separately.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryLedgerStore,
    reads_down: AtomicBool,
    writes_down: AtomicBool,
    upserts: AtomicUsize,
}

impl FlakyStore {
    fn set_down(&self, down: bool) {
        self.reads_down.store(down, Ordering::SeqCst);
        self.writes_down.store(down, Ordering::SeqCst);
    }

    fn set_writes_down(&self, down: bool) {
        self.writes_down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn get_all(&self) -> parking_core::Result<Vec<SpotRecord>> {
        if self.reads_down.load(Ordering::SeqCst) {
            return Err(LedgerError::store_unavailable("snapshot refused"));
        }
        self.inner.get_all().await
    }

    async fn upsert(&self, patch: &SpotPatch) -> parking_core::Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.writes_down.load(Ordering::SeqCst) {
            return Err(LedgerError::store_unavailable("upsert refused"));
        }
        self.inner.upsert(patch).await
    }
}

fn pinned_state() -> SpotStateService {
    let at = Utc
        .with_ymd_and_hms(2025, 1, 10, 9, 30, 0)
        .single()
        .unwrap();
    SpotStateService::default().with_clock(move || at)
}

fn sync_config(policy: WriteFailurePolicy) -> SyncConfig {
    SyncConfig {
        write_failure_policy: policy,
        retry: RetryConfig {
            max_attempts: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        },
        ..SyncConfig::default()
    }
}

fn controller<S: LedgerStore + 'static>(
    store: Arc<S>,
    policy: WriteFailurePolicy,
) -> SyncController<S> {
    SyncController::new(store, pinned_state(), sync_config(policy))
}

#[tokio::test]
async fn occupy_pay_release_scenario() {
    let store = Arc::new(MemoryLedgerStore::new());
    let operator = controller(store.clone(), WriteFailurePolicy::FailOpen);
    let id = SpotId::from("A-05");

    operator.load().await.unwrap();
    assert_eq!(operator.get(&id).await.status, SpotStatus::Free);

    operator
        .occupy(&id, "Ana Ruiz", "1234abc", "600111222")
        .await
        .unwrap();

    // A second operator sees the committed record after a fresh load.
    let observer = controller(store.clone(), WriteFailurePolicy::FailOpen);
    let loaded = observer.load().await.unwrap();
    let record = &loaded[&id];
    assert_eq!(record.status, SpotStatus::Occupied);
    assert_eq!(record.tenant_name.as_deref(), Some("Ana Ruiz"));
    assert_eq!(record.plate.as_deref(), Some("1234ABC"));
    assert_eq!(record.phone.as_deref(), Some("600111222"));
    assert_eq!(record.occupied_since.as_deref(), Some(ENTRY));

    operator
        .record_payment(&id, "2025", "Enero", "40")
        .await
        .unwrap();
    let loaded = observer.load().await.unwrap();
    assert_eq!(loaded[&id].payment("2025", Month::Enero), Some("40"));
    assert_eq!(loaded[&id].status, SpotStatus::Occupied);

    operator.release(&id).await.unwrap();
    let loaded = observer.load().await.unwrap();
    let record = &loaded[&id];
    assert_eq!(record.status, SpotStatus::Free);
    assert_eq!(record.tenant_name.as_deref(), Some(""));
    assert_eq!(record.plate.as_deref(), Some(""));
    assert_eq!(record.phone.as_deref(), Some(""));
    assert_eq!(record.occupied_since, None);
    assert_eq!(record.payment("2025", Month::Enero), Some("40"));
}

#[tokio::test]
async fn releasing_twice_equals_releasing_once() {
    let store = Arc::new(MemoryLedgerStore::new());
    let c = controller(store.clone(), WriteFailurePolicy::FailOpen);
    let id = SpotId::from("B-03");

    c.occupy(&id, "Luis", "9876xyz", "611").await.unwrap();
    c.release(&id).await.unwrap();
    let once = c.load().await.unwrap()[&id].clone();

    c.release(&id).await.unwrap();
    let twice = c.load().await.unwrap()[&id].clone();
    assert_eq!(once, twice);
}

#[tokio::test]
async fn payment_leaves_other_cells_alone() {
    let store = Arc::new(MemoryLedgerStore::new());
    let c = controller(store.clone(), WriteFailurePolicy::FailOpen);
    let id = SpotId::from("C-10");

    c.occupy(&id, "Eva", "1111bbb", "622").await.unwrap();
    c.record_payment(&id, "2024", "Febrero", "50").await.unwrap();
    c.record_payment(&id, "2023", "Marzo", "45").await.unwrap();
    let before = c.load().await.unwrap()[&id].clone();

    c.record_payment(&id, "2024", "Marzo", "50€").await.unwrap();
    let after = c.load().await.unwrap()[&id].clone();

    assert_eq!(after.payment("2024", Month::Marzo), Some("50€"));
    assert_eq!(after.payment("2024", Month::Febrero), Some("50"));
    assert_eq!(after.payment("2023", Month::Marzo), Some("45"));
    assert_eq!(after.status, before.status);
    assert_eq!(after.plate, before.plate);
    assert_eq!(after.occupied_since, before.occupied_since);
}

#[tokio::test]
async fn edit_clearing_plate_frees_the_spot() {
    let store = Arc::new(MemoryLedgerStore::new());
    let c = controller(store.clone(), WriteFailurePolicy::FailOpen);
    let id = SpotId::from("D-01");

    c.occupy(&id, "Marta", "2222ccc", "633").await.unwrap();
    c.update_info(
        &id,
        &InfoUpdate {
            plate: Some(String::new()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let record = c.load().await.unwrap()[&id].clone();
    assert_eq!(record.status, SpotStatus::Free);
    assert_eq!(record.occupied_since, None);
    assert_eq!(record.tenant_name.as_deref(), Some(""));
}

#[tokio::test]
async fn fail_open_keeps_optimistic_record_and_flags_reconcile() {
    let store = Arc::new(FlakyStore::default());
    let c = controller(store.clone(), WriteFailurePolicy::FailOpen);
    let id = SpotId::from("A-05");
    c.load().await.unwrap();

    store.set_down(true);
    let err = c
        .occupy(&id, "Ana Ruiz", "1234abc", "600111222")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::StoreUnavailable { .. }));
    assert_eq!(store.upserts.load(Ordering::SeqCst), 2);

    let local = c.get(&id).await;
    assert_eq!(local.status, SpotStatus::Occupied);
    assert_eq!(local.plate.as_deref(), Some("1234ABC"));
    assert!(c.needs_reconcile().await);
    assert!(c.is_stale().await);

    // Once the store is back, a load replaces the local copy with the truth.
    store.set_down(false);
    c.load().await.unwrap();
    assert!(!c.needs_reconcile().await);
    assert_eq!(c.get(&id).await.status, SpotStatus::Free);
}

#[tokio::test]
async fn fail_open_refresh_keeps_optimistic_record_while_reads_work() {
    let store = Arc::new(FlakyStore::default());
    let c = controller(store.clone(), WriteFailurePolicy::FailOpen);
    let id = SpotId::from("A-05");
    c.load().await.unwrap();

    // Another operator's write lands while this controller is not looking.
    let other = controller(store.clone(), WriteFailurePolicy::FailOpen);
    other
        .occupy(&SpotId::from("B-01"), "Luis", "5555fff", "611")
        .await
        .unwrap();

    store.set_writes_down(true);
    let err = c
        .occupy(&id, "Ana", "1234abc", "600")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::StoreUnavailable { .. }));

    let local = c.get(&id).await;
    assert_eq!(local.status, SpotStatus::Occupied);
    assert_eq!(local.plate.as_deref(), Some("1234ABC"));
    assert!(c.needs_reconcile().await);
    assert_eq!(c.pending().await, vec![id.clone()]);

    // The refresh after the failure still picked up the other spot.
    assert_eq!(
        c.get(&SpotId::from("B-01")).await.plate.as_deref(),
        Some("5555FFF")
    );

    // An explicit load reconciles with the store.
    store.set_writes_down(false);
    c.load().await.unwrap();
    assert!(!c.needs_reconcile().await);
    assert!(c.pending().await.is_empty());
    assert_eq!(c.get(&id).await.status, SpotStatus::Free);
}

#[tokio::test]
async fn fail_closed_restores_previous_record() {
    let store = Arc::new(FlakyStore::default());
    let c = controller(store.clone(), WriteFailurePolicy::FailClosed);
    let id = SpotId::from("A-06");

    c.occupy(&id, "Pablo", "3333ddd", "644").await.unwrap();
    let before = c.get(&id).await;

    store.set_down(true);
    let err = c.release(&id).await.unwrap_err();
    assert!(matches!(err, LedgerError::StoreUnavailable { .. }));
    assert_eq!(c.get(&id).await, before);
    assert!(!c.needs_reconcile().await);
}

#[tokio::test]
async fn fail_closed_forgets_never_committed_spot() {
    let store = Arc::new(FlakyStore::default());
    let c = controller(store.clone(), WriteFailurePolicy::FailClosed);
    let id = SpotId::from("E-12");

    store.set_down(true);
    c.occupy(&id, "Rosa", "4444eee", "655").await.unwrap_err();
    assert!(c.snapshot().await.is_empty());
}

#[tokio::test]
async fn spawned_commit_failure_flags_reconcile() {
    let store = Arc::new(FlakyStore::default());
    let c = controller(store.clone(), WriteFailurePolicy::FailOpen);
    store.set_down(true);

    let result = c
        .spawn_commit(SpotPatch::new(SpotId::from("F-01")))
        .await
        .unwrap();
    assert!(result.is_err());
    assert!(c.needs_reconcile().await);
    assert_eq!(c.pending().await, vec![SpotId::from("F-01")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_occupations_of_different_spots_both_land() {
    let store = Arc::new(MemoryLedgerStore::new());
    let left = Arc::new(controller(store.clone(), WriteFailurePolicy::FailOpen));
    let right = Arc::new(controller(store.clone(), WriteFailurePolicy::FailOpen));

    let a = {
        let left = left.clone();
        tokio::spawn(async move {
            left.occupy(&SpotId::from("A-01"), "Uno", "1000aaa", "601")
                .await
        })
    };
    let b = {
        let right = right.clone();
        tokio::spawn(async move {
            right
                .occupy(&SpotId::from("M-01"), "Dos", "2000bbb", "602")
                .await
        })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let loaded = left.load().await.unwrap();
    assert_eq!(loaded[&SpotId::from("A-01")].plate.as_deref(), Some("1000AAA"));
    assert_eq!(loaded[&SpotId::from("M-01")].plate.as_deref(), Some("2000BBB"));
}

#[tokio::test]
async fn unregistered_spot_never_reaches_the_store() {
    let store = Arc::new(FlakyStore::default());
    let c = controller(store.clone(), WriteFailurePolicy::FailOpen);

    let err = c
        .occupy(&SpotId::from("Z-01"), "Nadie", "0000zzz", "600")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
    assert_eq!(store.upserts.load(Ordering::SeqCst), 0);
}
