//! Spot record model and its wire shape.
//!
//! Wire keys follow the persisted documents (`id_plaza`, `estado`, `nombre`,
//! `matricula`, `telefono`, `fecha_entrada`, `pagos`), so a record read from
//! the store serializes back to the same JSON it was written with.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of one physical spot (`A-05`, `M-02`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpotId(String);

impl SpotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for SpotId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SpotStatus {
    #[default]
    #[serde(rename = "libre")]
    Free,
    #[serde(rename = "ocupada")]
    Occupied,
}

impl SpotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "libre",
            Self::Occupied => "ocupada",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "libre" => Some(Self::Free),
            "ocupada" => Some(Self::Occupied),
            _ => None,
        }
    }
}

impl fmt::Display for SpotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => f.pad("FREE"),
            Self::Occupied => f.pad("OCCUPIED"),
        }
    }
}

/// Calendar months under their canonical ledger spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Month {
    Enero,
    Febrero,
    Marzo,
    Abril,
    Mayo,
    Junio,
    Julio,
    Agosto,
    Septiembre,
    Octubre,
    Noviembre,
    Diciembre,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Enero,
        Month::Febrero,
        Month::Marzo,
        Month::Abril,
        Month::Mayo,
        Month::Junio,
        Month::Julio,
        Month::Agosto,
        Month::Septiembre,
        Month::Octubre,
        Month::Noviembre,
        Month::Diciembre,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Enero => "Enero",
            Self::Febrero => "Febrero",
            Self::Marzo => "Marzo",
            Self::Abril => "Abril",
            Self::Mayo => "Mayo",
            Self::Junio => "Junio",
            Self::Julio => "Julio",
            Self::Agosto => "Agosto",
            Self::Septiembre => "Septiembre",
            Self::Octubre => "Octubre",
            Self::Noviembre => "Noviembre",
            Self::Diciembre => "Diciembre",
        }
    }

    /// Case-insensitive lookup; surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Year -> month name -> free-text payment note.
pub type Payments = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotRecord {
    /// Store-generated identity. Present on reads, never accepted on writes.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub store_key: Option<String>,

    #[serde(rename = "id_plaza")]
    pub id: SpotId,

    #[serde(rename = "estado", default)]
    pub status: SpotStatus,

    #[serde(rename = "nombre", default, skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<String>,

    #[serde(rename = "matricula", default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,

    #[serde(rename = "telefono", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// RFC 3339 text, kept verbatim.
    #[serde(rename = "fecha_entrada", default)]
    pub occupied_since: Option<String>,

    #[serde(rename = "pagos", default)]
    pub payments: Payments,
}

impl SpotRecord {
    /// The implicit record of a spot nobody has written yet.
    pub fn free(id: SpotId) -> Self {
        Self {
            store_key: None,
            id,
            status: SpotStatus::Free,
            tenant_name: None,
            plate: None,
            phone: None,
            occupied_since: None,
            payments: Payments::new(),
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.status == SpotStatus::Occupied
    }

    pub fn plate_str(&self) -> &str {
        self.plate.as_deref().unwrap_or_default()
    }

    pub fn occupied_since_at(&self) -> Option<DateTime<Utc>> {
        self.occupied_since.as_deref().and_then(parse_timestamp)
    }

    pub fn payment(&self, year: &str, month: Month) -> Option<&str> {
        self.payments
            .get(year)
            .and_then(|months| months.get(month.name()))
            .map(String::as_str)
    }
}

/// Plates are stored trimmed and upper-cased.
pub fn normalize_plate(plate: &str) -> String {
    plate.trim().to_uppercase()
}

/// Millisecond precision with a `Z` suffix, e.g. `2025-01-10T09:30:00.000Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}
