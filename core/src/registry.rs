//! Static spot registry for the floor.
//!
//! Zones and their sizes are fixed at build time. Identifiers are
//! `{zone}-{seq:02}` with the sequence starting at 1, listed zone by zone in
//! floor order.

use serde::Serialize;

use crate::record::SpotId;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SpotCategory {
    Car,
    Motorcycle,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Zone {
    pub code: &'static str,
    pub category: SpotCategory,
    pub spots: u8,
}

impl Zone {
    /// Identifiers of this zone in sequence order.
    pub fn spot_ids(&self) -> impl Iterator<Item = SpotId> + '_ {
        (1..=self.spots).map(move |seq| SpotId::new(format!("{}-{seq:02}", self.code)))
    }

    fn contains(&self, id: &str) -> bool {
        let Some(rest) = id.strip_prefix(self.code) else {
            return false;
        };
        let Some(seq) = rest.strip_prefix('-') else {
            return false;
        };
        seq.len() == 2
            && seq.bytes().all(|b| b.is_ascii_digit())
            && seq
                .parse::<u8>()
                .is_ok_and(|n| (1..=self.spots).contains(&n))
    }
}

const ZONES: &[Zone] = &[
    Zone {
        code: "A",
        category: SpotCategory::Car,
        spots: 14,
    },
    Zone {
        code: "B",
        category: SpotCategory::Car,
        spots: 13,
    },
    Zone {
        code: "C",
        category: SpotCategory::Car,
        spots: 15,
    },
    Zone {
        code: "D",
        category: SpotCategory::Car,
        spots: 15,
    },
    Zone {
        code: "E",
        category: SpotCategory::Car,
        spots: 20,
    },
    Zone {
        code: "F",
        category: SpotCategory::Car,
        spots: 9,
    },
    Zone {
        code: "M",
        category: SpotCategory::Motorcycle,
        spots: 6,
    },
];

/// Zone metadata in floor order.
pub fn zones() -> &'static [Zone] {
    ZONES
}

/// Every registered spot identifier, zone by zone.
pub fn list_spot_identifiers() -> Vec<SpotId> {
    ZONES.iter().flat_map(Zone::spot_ids).collect()
}

pub fn zone_of(id: &str) -> Option<&'static Zone> {
    ZONES.iter().find(|zone| zone.contains(id))
}

pub fn is_registered(id: &str) -> bool {
    zone_of(id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_zone_in_floor_order() {
        let ids = list_spot_identifiers();
        assert_eq!(ids.len(), 14 + 13 + 15 + 15 + 20 + 9 + 6);
        assert_eq!(ids.first().map(SpotId::as_str), Some("A-01"));
        assert_eq!(ids.get(14).map(SpotId::as_str), Some("B-01"));
        assert_eq!(ids.last().map(SpotId::as_str), Some("M-06"));
    }

    #[test]
    fn listing_is_deterministic_and_unique() {
        let first = list_spot_identifiers();
        let second = list_spot_identifiers();
        assert_eq!(first, second);

        let mut deduped = first.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), first.len());
    }

    #[test]
    fn recognizes_registered_identifiers() {
        assert!(is_registered("A-05"));
        assert!(is_registered("E-20"));
        assert!(is_registered("M-01"));
        assert_eq!(zone_of("M-03").map(|z| z.category), Some(SpotCategory::Motorcycle));
        assert_eq!(zone_of("F-09").map(|z| z.code), Some("F"));
    }

    #[test]
    fn rejects_unknown_identifiers() {
        for id in ["A-00", "A-15", "F-10", "A-5", "A-005", "a-05", "Z-01", "", "A05", "A-+1"] {
            assert!(!is_registered(id), "{id} should not be registered");
        }
    }
}
