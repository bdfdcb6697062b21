#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical location schema and record model.
//!
//! Every harvested store is normalised into a [`CanonicalRecord`]: a fixed,
//! ordered set of columns matching the `locations.csv` import format.
//! This crate also owns the per-harvest identity structures: [`HandleSet`]
//! for URL-safe unique handles and [`FingerprintSet`] for fuzzy
//! name/address/city deduplication.

use std::collections::{BTreeMap, HashSet};

/// The canonical output columns, in CSV order.
///
/// Note the leading space in `" Tags"` — it is part of the header in the
/// import format and must be preserved verbatim.
pub const CANONICAL_SCHEMA: [&str; 57] = [
    "Handle",
    "Name",
    "Status",
    "Address Line 1",
    "Address Line 2",
    "Postal/ZIP Code",
    "City",
    "State/Province/Region",
    "Country",
    "Phone",
    "Email",
    "Website",
    "Image URL",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
    "Page Title",
    "Page Description",
    "Meta Title",
    "Meta Description",
    "Latitude",
    "Longitude",
    "Priority",
    "Name - FR",
    "Page Title - FR",
    "Page Description - FR",
    "Name - ZH-CN",
    "Page Title - ZH-CN",
    "Page Description - ZH-CN",
    "Name - ES",
    "Page Title - ES",
    "Page Description - ES",
    " Tags",
    "Custom Brands",
    "Custom Brands - FR",
    "Custom Brands - ZH-CN",
    "Custom Brands - ES",
    "Custom Button title 1",
    "Custom Button title 1 - FR",
    "Custom Button title 1 - ZH-CN",
    "Custom Button title 1 - ES",
    "Custom Button URL 1",
    "Custom Button URL 1 - FR",
    "Custom Button URL 1 - ZH-CN",
    "Custom Button URL 1 - ES",
    "Custom Button title 2",
    "Custom Button title 2 - FR",
    "Custom Button title 2 - ZH-CN",
    "Custom Button title 2 - ES",
    "Custom Button URL 2",
    "Custom Button URL 2 - FR",
    "Custom Button URL 2 - ZH-CN",
    "Custom Button URL 2 - ES",
];

/// The fields every harvest must populate (or drop the record).
pub const REQUIRED_FIELDS: [&str; 4] = ["Handle", "Name", "Latitude", "Longitude"];

/// One normalised store location.
///
/// Internally a map from canonical column name to string value; every
/// column from [`CANONICAL_SCHEMA`] is always present (empty when the
/// source had nothing), so CSV rows line up without per-row checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRecord {
    fields: BTreeMap<String, String>,
}

impl CanonicalRecord {
    /// Creates a record with every canonical field set to the empty string.
    #[must_use]
    pub fn new() -> Self {
        let fields = CANONICAL_SCHEMA
            .iter()
            .map(|name| ((*name).to_owned(), String::new()))
            .collect();
        Self { fields }
    }

    /// Returns the value of a canonical field, or `""` for unknown names.
    #[must_use]
    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map_or("", String::as_str)
    }

    /// Sets a canonical field. Values for names outside the schema are
    /// ignored — the output shape is fixed.
    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        if self.fields.contains_key(field) {
            self.fields.insert(field.to_owned(), value.into());
        }
    }

    /// Whether a canonical field is non-empty after trimming.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        !self.get(field).trim().is_empty()
    }

    /// Iterates the field values in schema (CSV column) order.
    pub fn values_ordered(&self) -> impl Iterator<Item = &str> {
        CANONICAL_SCHEMA.iter().map(|name| self.get(name))
    }

    /// The fuzzy-deduplication fingerprint for this record, or `None`
    /// when the record lacks a name or address to fingerprint on.
    #[must_use]
    pub fn fingerprint(&self) -> Option<AddressFingerprint> {
        AddressFingerprint::new(
            self.get("Name"),
            self.get("Address Line 1"),
            self.get("City"),
        )
    }
}

impl Default for CanonicalRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-harvest registry of emitted handles.
///
/// Handles must be unique within one harvest; collisions get the first
/// free `-2`, `-3`, … suffix.
#[derive(Debug, Default)]
pub struct HandleSet {
    seen: HashSet<String>,
}

impl HandleSet {
    /// Creates an empty handle set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a proposed handle, returning the (possibly suffixed)
    /// handle that is actually free.
    pub fn claim(&mut self, proposed: &str) -> String {
        let base = if proposed.is_empty() { "store" } else { proposed };
        if self.seen.insert(base.to_owned()) {
            return base.to_owned();
        }
        let mut counter = 2u32;
        loop {
            let candidate = format!("{base}-{counter}");
            if self.seen.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Whether a handle has already been claimed.
    #[must_use]
    pub fn contains(&self, handle: &str) -> bool {
        self.seen.contains(handle)
    }

    /// Number of claimed handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no handles have been claimed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Lowercased `(name, address line 1, city)` tuple used for fuzzy
/// deduplication across every executor's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressFingerprint {
    name: String,
    addr1: String,
    city: String,
}

impl AddressFingerprint {
    /// Builds a fingerprint; requires a non-empty name and address so
    /// that sparse records are never collapsed into each other.
    #[must_use]
    pub fn new(name: &str, addr1: &str, city: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        let addr1 = addr1.trim().to_lowercase();
        let city = city.trim().to_lowercase();
        if name.is_empty() || addr1.is_empty() {
            return None;
        }
        Some(Self { name, addr1, city })
    }
}

/// Tracks fingerprints seen in the current harvest.
#[derive(Debug, Default)]
pub struct FingerprintSet {
    seen: HashSet<AddressFingerprint>,
}

impl FingerprintSet {
    /// Creates an empty fingerprint set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fingerprint; returns `false` if it was already seen
    /// (i.e. the record is a duplicate).
    pub fn insert(&mut self, fingerprint: AddressFingerprint) -> bool {
        self.seen.insert(fingerprint)
    }
}

/// A record dropped by the normalizer, with enough context for the
/// excluded-stores report.
#[derive(Debug, Clone)]
pub struct Excluded {
    /// Store name, or `"Unknown"` when the source had none.
    pub name: String,
    /// Joined address parts, or `"Address not available"`.
    pub address: String,
    /// Human-readable reason the record was dropped.
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_starts_with_all_fields_empty() {
        let record = CanonicalRecord::new();
        assert_eq!(record.values_ordered().count(), CANONICAL_SCHEMA.len());
        assert!(record.values_ordered().all(str::is_empty));
    }

    #[test]
    fn set_ignores_unknown_fields() {
        let mut record = CanonicalRecord::new();
        record.set("Nonsense Column", "value");
        assert_eq!(record.get("Nonsense Column"), "");
    }

    #[test]
    fn handle_set_suffixes_collisions() {
        let mut handles = HandleSet::new();
        assert_eq!(handles.claim("omega-paris"), "omega-paris");
        assert_eq!(handles.claim("omega-paris"), "omega-paris-2");
        assert_eq!(handles.claim("omega-paris"), "omega-paris-3");
        assert_eq!(handles.len(), 3);
    }

    #[test]
    fn empty_handle_falls_back_to_store() {
        let mut handles = HandleSet::new();
        assert_eq!(handles.claim(""), "store");
        assert_eq!(handles.claim(""), "store-2");
    }

    #[test]
    fn fingerprint_requires_name_and_address() {
        assert!(AddressFingerprint::new("A", "", "NYC").is_none());
        assert!(AddressFingerprint::new("", "1 Main St", "NYC").is_none());
        let a = AddressFingerprint::new("A Store", "1 Main St", "NYC").unwrap();
        let b = AddressFingerprint::new("a store ", " 1 main st", "nyc").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_set_detects_duplicates() {
        let mut set = FingerprintSet::new();
        let fp = AddressFingerprint::new("A", "1 Main St", "NYC").unwrap();
        assert!(set.insert(fp.clone()));
        assert!(!set.insert(fp));
    }
}
