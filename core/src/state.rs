//! Spot state transitions.
//!
//! Pure functions over the current local record. Each operation validates its
//! input and returns a [`Transition`]: the full record to apply locally and
//! the minimal patch to persist. Nothing here touches the store.
//!
//! ```text
//! FREE --occupy (non-empty plate)--> OCCUPIED
//! OCCUPIED --release | edit clearing plate--> FREE
//! OCCUPIED --occupy | edit keeping plate--> OCCUPIED  (entry time kept)
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::errors::{LedgerError, Result};
use crate::patch::SpotPatch;
use crate::record::{Month, SpotRecord, SpotStatus, format_timestamp, normalize_plate};
use crate::registry;

/// Source of "now" for entry timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub record: SpotRecord,
    pub patch: SpotPatch,
}

/// Free-form tenant edit. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoUpdate {
    pub tenant_name: Option<String>,
    pub plate: Option<String>,
    pub phone: Option<String>,
}

#[derive(Clone)]
pub struct SpotStateService {
    enforce_registry: bool,
    clock: Clock,
}

impl std::fmt::Debug for SpotStateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotStateService")
            .field("enforce_registry", &self.enforce_registry)
            .finish_non_exhaustive()
    }
}

impl Default for SpotStateService {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SpotStateService {
    pub fn new(enforce_registry: bool) -> Self {
        Self {
            enforce_registry,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, mainly to pin entry times in tests.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn enforces_registry(&self) -> bool {
        self.enforce_registry
    }

    fn now(&self) -> String {
        format_timestamp((self.clock)())
    }

    fn check_target(&self, current: &SpotRecord) -> Result<()> {
        if self.enforce_registry && !registry::is_registered(current.id.as_str()) {
            return Err(LedgerError::validation(format!(
                "unknown spot identifier: {}",
                current.id
            )));
        }
        Ok(())
    }

    /// Assign a tenant. The entry time is stamped only on a FREE -> OCCUPIED
    /// edge; re-occupying keeps the original one.
    pub fn occupy(
        &self,
        current: &SpotRecord,
        tenant_name: &str,
        plate: &str,
        phone: &str,
    ) -> Result<Transition> {
        self.check_target(current)?;
        let plate = normalize_plate(plate);
        if plate.is_empty() {
            return Err(LedgerError::validation("plate must not be empty"));
        }

        let mut record = current.clone();
        let mut patch = SpotPatch::new(current.id.clone());

        record.status = SpotStatus::Occupied;
        record.tenant_name = Some(tenant_name.to_string());
        record.plate = Some(plate.clone());
        record.phone = Some(phone.to_string());
        patch.status = Some(SpotStatus::Occupied);
        patch.tenant_name = Some(Some(tenant_name.to_string()));
        patch.plate = Some(Some(plate));
        patch.phone = Some(Some(phone.to_string()));

        if !current.is_occupied() {
            let since = self.now();
            record.occupied_since = Some(since.clone());
            patch.occupied_since = Some(Some(since));
        }

        Ok(Transition { record, patch })
    }

    /// Clear the tenant. Payments stay; releasing a FREE spot is a no-op on
    /// the record.
    pub fn release(&self, current: &SpotRecord) -> Result<Transition> {
        self.check_target(current)?;
        let mut record = current.clone();
        let mut patch = SpotPatch::new(current.id.clone());
        clear_tenant(&mut record, &mut patch);
        Ok(Transition { record, patch })
    }

    /// Set `payments[year][month] = note`. Status and tenant are untouched.
    pub fn record_payment(
        &self,
        current: &SpotRecord,
        year: &str,
        month: &str,
        note: &str,
    ) -> Result<Transition> {
        self.check_target(current)?;
        let year = year.trim();
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LedgerError::validation(format!(
                "year must be four digits: {year:?}"
            )));
        }
        let Some(month) = Month::parse(month) else {
            return Err(LedgerError::validation(format!("unknown month: {month:?}")));
        };

        let mut record = current.clone();
        record
            .payments
            .entry(year.to_string())
            .or_default()
            .insert(month.name().to_string(), note.to_string());

        // The store replaces whole fields, so the full mapping goes out.
        let mut patch = SpotPatch::new(current.id.clone());
        patch.payments = Some(record.payments.clone());

        Ok(Transition { record, patch })
    }

    /// Edit tenant details without an explicit occupation event.
    ///
    /// The plate drives status: clearing it frees the spot exactly like
    /// [`release`](Self::release), setting it where there was none occupies
    /// the spot and stamps the entry time, anything else keeps the current
    /// status.
    pub fn update_info(&self, current: &SpotRecord, update: &InfoUpdate) -> Result<Transition> {
        self.check_target(current)?;
        let mut record = current.clone();
        let mut patch = SpotPatch::new(current.id.clone());

        if let Some(name) = &update.tenant_name {
            record.tenant_name = Some(name.clone());
            patch.tenant_name = Some(Some(name.clone()));
        }
        if let Some(phone) = &update.phone {
            record.phone = Some(phone.clone());
            patch.phone = Some(Some(phone.clone()));
        }

        let Some(plate) = update.plate.as_deref() else {
            return Ok(Transition { record, patch });
        };
        let plate = normalize_plate(plate);

        if plate.is_empty() {
            clear_tenant(&mut record, &mut patch);
        } else {
            record.plate = Some(plate.clone());
            patch.plate = Some(Some(plate));
            // A plate on a spot that had none is an entry, even if the stored
            // status already claims OCCUPIED.
            if !current.is_occupied() || current.plate_str().is_empty() {
                record.status = SpotStatus::Occupied;
                patch.status = Some(SpotStatus::Occupied);
                if !current.is_occupied() || current.occupied_since.is_none() {
                    let since = self.now();
                    record.occupied_since = Some(since.clone());
                    patch.occupied_since = Some(Some(since));
                }
            }
        }

        Ok(Transition { record, patch })
    }
}

fn clear_tenant(record: &mut SpotRecord, patch: &mut SpotPatch) {
    record.status = SpotStatus::Free;
    record.tenant_name = Some(String::new());
    record.plate = Some(String::new());
    record.phone = Some(String::new());
    record.occupied_since = None;

    patch.status = Some(SpotStatus::Free);
    patch.tenant_name = Some(Some(String::new()));
    patch.plate = Some(Some(String::new()));
    patch.phone = Some(Some(String::new()));
    patch.occupied_since = Some(None);
}
