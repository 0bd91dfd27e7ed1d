//! SQLite system of record.
//!
//! One row per spot in `spots`. Partial upserts are a single
//! `INSERT .. ON CONFLICT DO UPDATE` statement with a presence flag per
//! column, so concurrent writers to the same spot never interleave
//! field-by-field. `pagos` is stored as JSON text and `_id` is the rowid.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parking_core::errors::{LedgerError, Result};
use parking_core::record::{Payments, SpotId, SpotRecord, SpotStatus};
use parking_core::{LedgerStore, SpotPatch};
use rusqlite::{Connection, named_params};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS spots (
    id              INTEGER PRIMARY KEY,
    id_plaza        TEXT NOT NULL UNIQUE,
    estado          TEXT NOT NULL DEFAULT 'libre',
    nombre          TEXT,
    matricula       TEXT,
    telefono        TEXT,
    fecha_entrada   TEXT,
    pagos           TEXT NOT NULL DEFAULT '{}'
);
"#;

const UPSERT_SQL: &str = r#"
INSERT INTO spots (id_plaza, estado, nombre, matricula, telefono, fecha_entrada, pagos)
VALUES (
    :id_plaza,
    COALESCE(:estado, 'libre'),
    :nombre,
    :matricula,
    :telefono,
    :fecha_entrada,
    COALESCE(:pagos, '{}')
)
ON CONFLICT(id_plaza) DO UPDATE SET
    estado        = CASE WHEN :has_estado        THEN excluded.estado        ELSE spots.estado        END,
    nombre        = CASE WHEN :has_nombre        THEN excluded.nombre        ELSE spots.nombre        END,
    matricula     = CASE WHEN :has_matricula     THEN excluded.matricula     ELSE spots.matricula     END,
    telefono      = CASE WHEN :has_telefono      THEN excluded.telefono      ELSE spots.telefono      END,
    fecha_entrada = CASE WHEN :has_fecha_entrada THEN excluded.fecha_entrada ELSE spots.fecha_entrada END,
    pagos         = CASE WHEN :has_pagos         THEN excluded.pagos         ELSE spots.pagos         END
"#;

/// Raw column values of one `spots` row.
type SpotRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

#[derive(Clone)]
pub struct SqliteLedgerStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedgerStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                LedgerError::store_unavailable_with_source(
                    format!("failed to create db directory: {}", parent.display()),
                    e,
                )
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            LedgerError::store_unavailable_with_source(
                format!("failed to open db at {}", path.display()),
                e,
            )
        })?;
        let store = Self::from_connection(conn)?;

        tracing::debug!(path = %path.display(), "ledger db initialized");
        Ok(store)
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LedgerError::store_unavailable_with_source("failed to open in-memory db", e)
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| LedgerError::store_unavailable_with_source("failed to apply schema", e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| LedgerError::store_unavailable("ledger db lock poisoned"))?;
            f(&guard)
        })
        .await
        .map_err(|e| LedgerError::store_unavailable_with_source("ledger db task failed", e))?
    }
}

fn read_all(conn: &Connection) -> Result<Vec<SpotRecord>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, id_plaza, estado, nombre, matricula, telefono, fecha_entrada, pagos
            FROM spots
            ORDER BY id_plaza
            "#,
        )
        .map_err(|e| LedgerError::store_unavailable_with_source("failed to prepare query", e))?;

    let rows = stmt
        .query_map([], |row| -> rusqlite::Result<SpotRow> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })
        .map_err(|e| LedgerError::store_unavailable_with_source("failed to query spots", e))?;

    let mut records = Vec::new();
    for row in rows {
        let row = row
            .map_err(|e| LedgerError::store_unavailable_with_source("failed to read spot row", e))?;
        records.push(record_from_row(row)?);
    }
    Ok(records)
}

fn record_from_row(row: SpotRow) -> Result<SpotRecord> {
    let (key, id, estado, nombre, matricula, telefono, fecha_entrada, pagos) = row;

    let Some(status) = SpotStatus::parse(&estado) else {
        return Err(LedgerError::store_unavailable(format!(
            "spot {id} has unknown estado {estado:?}"
        )));
    };
    let payments: Payments = serde_json::from_str(&pagos).map_err(|e| {
        LedgerError::store_unavailable_with_source(format!("spot {id} has corrupt pagos"), e)
    })?;

    Ok(SpotRecord {
        store_key: Some(key.to_string()),
        id: SpotId::new(id),
        status,
        tenant_name: nombre,
        plate: matricula,
        phone: telefono,
        occupied_since: fecha_entrada,
        payments,
    })
}

fn write_patch(conn: &Connection, patch: &SpotPatch) -> Result<()> {
    let pagos = patch
        .payments
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| LedgerError::store_unavailable_with_source("failed to encode pagos", e))?;
    let nombre = patch.tenant_name.clone().flatten();
    let matricula = patch.plate.clone().flatten();
    let telefono = patch.phone.clone().flatten();
    let fecha_entrada = patch.occupied_since.clone().flatten();

    conn.execute(
        UPSERT_SQL,
        named_params! {
            ":id_plaza": patch.id.as_str(),
            ":estado": patch.status.map(|s| s.as_str()),
            ":nombre": nombre,
            ":matricula": matricula,
            ":telefono": telefono,
            ":fecha_entrada": fecha_entrada,
            ":pagos": pagos,
            ":has_estado": patch.status.is_some(),
            ":has_nombre": patch.tenant_name.is_some(),
            ":has_matricula": patch.plate.is_some(),
            ":has_telefono": patch.phone.is_some(),
            ":has_fecha_entrada": patch.occupied_since.is_some(),
            ":has_pagos": patch.payments.is_some(),
        },
    )
    .map_err(|e| LedgerError::store_unavailable_with_source("failed to upsert spot", e))?;
    Ok(())
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn get_all(&self) -> Result<Vec<SpotRecord>> {
        self.with_conn(read_all).await
    }

    async fn upsert(&self, patch: &SpotPatch) -> Result<()> {
        let patch = patch.clone();
        let id = patch.id.clone();
        self.with_conn(move |conn| write_patch(conn, &patch)).await?;
        tracing::debug!(spot = %id, "upserted spot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn occupy_patch(id: &str) -> SpotPatch {
        let mut patch = SpotPatch::new(SpotId::from(id));
        patch.status = Some(SpotStatus::Occupied);
        patch.tenant_name = Some(Some("Ana Ruiz".to_string()));
        patch.plate = Some(Some("1234ABC".to_string()));
        patch.phone = Some(Some("600111222".to_string()));
        patch.occupied_since = Some(Some("2025-01-10T09:30:00.000Z".to_string()));
        patch
    }

    #[tokio::test]
    async fn empty_store_has_no_records() {
        let store = SqliteLedgerStore::open_in_memory().unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_then_partial_update() {
        let store = SqliteLedgerStore::open_in_memory().unwrap();
        store.upsert(&occupy_patch("A-05")).await.unwrap();

        let mut payment = SpotPatch::new(SpotId::from("A-05"));
        let mut payments = Payments::new();
        payments
            .entry("2025".to_string())
            .or_default()
            .insert("Enero".to_string(), "40".to_string());
        payment.payments = Some(payments.clone());
        store.upsert(&payment).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        let record = &all[0];
        assert_eq!(record.store_key.as_deref(), Some("1"));
        assert_eq!(record.status, SpotStatus::Occupied);
        assert_eq!(record.plate.as_deref(), Some("1234ABC"));
        assert_eq!(
            record.occupied_since.as_deref(),
            Some("2025-01-10T09:30:00.000Z")
        );
        assert_eq!(record.payments, payments);
    }

    #[tokio::test]
    async fn explicit_null_clears_but_absence_keeps() {
        let store = SqliteLedgerStore::open_in_memory().unwrap();
        store.upsert(&occupy_patch("B-02")).await.unwrap();

        let mut untouched = SpotPatch::new(SpotId::from("B-02"));
        untouched.phone = Some(Some(String::new()));
        store.upsert(&untouched).await.unwrap();
        let record = store.get_all().await.unwrap().remove(0);
        assert!(record.occupied_since.is_some());
        assert_eq!(record.phone.as_deref(), Some(""));

        let mut cleared = SpotPatch::new(SpotId::from("B-02"));
        cleared.status = Some(SpotStatus::Free);
        cleared.occupied_since = Some(None);
        store.upsert(&cleared).await.unwrap();
        let record = store.get_all().await.unwrap().remove(0);
        assert_eq!(record.status, SpotStatus::Free);
        assert_eq!(record.occupied_since, None);
        assert_eq!(record.tenant_name.as_deref(), Some("Ana Ruiz"));
    }

    #[tokio::test]
    async fn explicit_null_name_is_written() {
        let store = SqliteLedgerStore::open_in_memory().unwrap();
        store.upsert(&occupy_patch("B-03")).await.unwrap();

        let mut patch = SpotPatch::new(SpotId::from("B-03"));
        patch.tenant_name = Some(None);
        store.upsert(&patch).await.unwrap();

        let record = store.get_all().await.unwrap().remove(0);
        assert_eq!(record.tenant_name, None);
        assert_eq!(record.plate.as_deref(), Some("1234ABC"));
    }

    #[tokio::test]
    async fn new_row_from_sparse_patch_reads_free() {
        let store = SqliteLedgerStore::open_in_memory().unwrap();
        let mut patch = SpotPatch::new(SpotId::from("C-01"));
        patch.phone = Some(Some("600".to_string()));
        store.upsert(&patch).await.unwrap();

        let record = store.get_all().await.unwrap().remove(0);
        let mut expected = SpotRecord::free(SpotId::from("C-01"));
        expected.store_key = Some("1".to_string());
        expected.phone = Some("600".to_string());
        assert_eq!(record, expected);
    }

    #[tokio::test]
    async fn snapshot_is_in_identifier_order() {
        let store = SqliteLedgerStore::open_in_memory().unwrap();
        for id in ["C-02", "A-10", "B-01"] {
            store.upsert(&occupy_patch(id)).await.unwrap();
        }
        let ids: Vec<String> = store
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["A-10", "B-01", "C-02"]);
    }

    #[tokio::test]
    async fn reopening_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.db");

        {
            let store = SqliteLedgerStore::open(&path).unwrap();
            store.upsert(&occupy_patch("E-20")).await.unwrap();
        }

        let store = SqliteLedgerStore::open(&path).unwrap();
        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, SpotId::from("E-20"));
    }

    #[tokio::test]
    async fn concurrent_upserts_to_one_spot_do_not_interleave() {
        let store = SqliteLedgerStore::open_in_memory().unwrap();
        let mut tasks = Vec::new();
        for n in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let mut patch = SpotPatch::new(SpotId::from("D-04"));
                patch.tenant_name = Some(Some(format!("tenant-{n}")));
                patch.phone = Some(Some(format!("phone-{n}")));
                store.upsert(&patch).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let record = store.get_all().await.unwrap().remove(0);
        let name = record.tenant_name.unwrap();
        let phone = record.phone.unwrap();
        assert_eq!(
            name.trim_start_matches("tenant-"),
            phone.trim_start_matches("phone-")
        );
    }
}
