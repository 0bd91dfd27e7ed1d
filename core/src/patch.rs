//! Partial record updates.
//!
//! A [`SpotPatch`] names the spot and carries only the fields to replace.
//! Absent fields leave the stored value alone; a present field replaces it
//! whole, including the empty string. The text fields and `fecha_entrada` are
//! tri-state, so an explicit `null` clears them. `estado` and `pagos` always
//! hold a value and refuse `null`.

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{LedgerError, Result};
use crate::record::{Payments, SpotId, SpotRecord, SpotStatus, parse_timestamp};

/// Wire key of the store-generated identity.
pub const INTERNAL_IDENTITY_FIELD: &str = "_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotPatch {
    #[serde(rename = "id_plaza")]
    pub id: SpotId,

    /// `null` is rejected; a stored record always has a status.
    #[serde(
        rename = "estado",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_null"
    )]
    pub status: Option<SpotStatus>,

    #[serde(
        rename = "nombre",
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub tenant_name: Option<Option<String>>,

    #[serde(
        rename = "matricula",
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub plate: Option<Option<String>>,

    #[serde(
        rename = "telefono",
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub phone: Option<Option<String>>,

    /// `None`: untouched. `Some(None)`: cleared. `Some(Some(ts))`: replaced.
    #[serde(
        rename = "fecha_entrada",
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub occupied_since: Option<Option<String>>,

    /// `null` is rejected like `estado`.
    #[serde(
        rename = "pagos",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_null"
    )]
    pub payments: Option<Payments>,
}

/// Present fields must carry a value; absence is handled by `default`.
fn non_null<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl SpotPatch {
    pub fn new(id: SpotId) -> Self {
        Self {
            id,
            status: None,
            tenant_name: None,
            plate: None,
            phone: None,
            occupied_since: None,
            payments: None,
        }
    }

    /// Everything a full record carries, as a patch. The store identity is
    /// not part of it.
    pub fn from_record(record: &SpotRecord) -> Self {
        Self {
            id: record.id.clone(),
            status: Some(record.status),
            tenant_name: Some(record.tenant_name.clone()),
            plate: Some(record.plate.clone()),
            phone: Some(record.phone.clone()),
            occupied_since: Some(record.occupied_since.clone()),
            payments: Some(record.payments.clone()),
        }
    }

    /// Decode an upsert payload from the wire.
    ///
    /// The internal identity is stripped before decoding so a record that was
    /// read from the store can be posted back unchanged.
    pub fn from_wire(mut payload: serde_json::Value) -> Result<Self> {
        let Some(object) = payload.as_object_mut() else {
            return Err(LedgerError::validation("payload must be a JSON object"));
        };
        if strip_internal_identity(object).is_some() {
            tracing::debug!("stripped internal identity from upsert payload");
        }

        let patch: SpotPatch = serde_json::from_value(payload)
            .map_err(|e| LedgerError::validation(format!("invalid spot payload: {e}")))?;
        patch.validate()?;
        Ok(patch)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(LedgerError::validation("id_plaza must not be empty"));
        }
        if let Some(Some(ts)) = &self.occupied_since
            && parse_timestamp(ts).is_none()
        {
            return Err(LedgerError::validation(format!(
                "fecha_entrada is not an RFC 3339 timestamp: {ts}"
            )));
        }
        Ok(())
    }

    /// Merge into `record` with replace-on-present semantics.
    pub fn apply_to(&self, record: &mut SpotRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(name) = &self.tenant_name {
            record.tenant_name = name.clone();
        }
        if let Some(plate) = &self.plate {
            record.plate = plate.clone();
        }
        if let Some(phone) = &self.phone {
            record.phone = phone.clone();
        }
        if let Some(since) = &self.occupied_since {
            record.occupied_since = since.clone();
        }
        if let Some(payments) = &self.payments {
            record.payments = payments.clone();
        }
    }

    /// Result of applying this patch to `current`, or to a fresh FREE record.
    pub fn merged_into(&self, current: Option<&SpotRecord>) -> SpotRecord {
        let mut record = current
            .cloned()
            .unwrap_or_else(|| SpotRecord::free(self.id.clone()));
        self.apply_to(&mut record);
        record
    }
}

/// Remove the store identity from a wire object, returning it if present.
pub fn strip_internal_identity(
    object: &mut serde_json::Map<String, serde_json::Value>,
) -> Option<serde_json::Value> {
    object.remove(INTERNAL_IDENTITY_FIELD)
}
