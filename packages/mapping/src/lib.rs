#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Field mapping between raw back-end records and the canonical schema.
//!
//! A [`FieldMap`] tells the normalizer where each canonical field lives
//! inside a raw record, as a [`FieldSpec`] per field: a direct
//! dot-separated path, a first-non-empty list of paths, or a rule with a
//! default and a named transform.
//!
//! Maps come from two places: explicit brand configuration, or
//! [`infer::infer_field_map`], which derives one from a handful of sample
//! records by flattening them and running a ranked ladder of heuristics
//! per canonical field.

pub mod extract;
pub mod flatten;
pub mod infer;
pub mod spec;

use std::collections::BTreeMap;

pub use extract::{extract_field, normalize_field_value};
pub use flatten::{flatten, resolve_path};
pub use infer::infer_field_map;
pub use spec::{FieldSpec, Transform};

/// Mapping from canonical field names to source field specs, plus the
/// base URL used to resolve partial store URLs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    specs: BTreeMap<String, FieldSpec>,
    base_url: Option<String>,
}

impl FieldMap {
    /// Creates an empty map (raw records are assumed to already use
    /// canonical field names).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a spec for a canonical field.
    pub fn insert(&mut self, canonical: impl Into<String>, spec: FieldSpec) {
        self.specs.insert(canonical.into(), spec);
    }

    /// Returns the spec for a canonical field, if any.
    #[must_use]
    pub fn get(&self, canonical: &str) -> Option<&FieldSpec> {
        self.specs.get(canonical)
    }

    /// Whether the map carries no field rules at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Number of mapped canonical fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Iterates `(canonical field, spec)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldSpec)> {
        self.specs.iter()
    }

    /// Sets the base URL used to resolve partial store URLs.
    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = Some(base_url.into());
    }

    /// The base URL for partial-URL resolution, when known.
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }
}

impl FromIterator<(String, FieldSpec)> for FieldMap {
    fn from_iter<T: IntoIterator<Item = (String, FieldSpec)>>(iter: T) -> Self {
        Self {
            specs: iter.into_iter().collect(),
            base_url: None,
        }
    }
}
