#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Brand configuration and country reference data.
//!
//! Brand configuration is a JSON document, either a single brand object
//! or a map keyed by brand id. It can pin the endpoint pattern, supply an
//! explicit field mapping (auto-inference is skipped for mapped fields),
//! restrict the country axis, and add request headers.
//!
//! The country reference (ISO2 code → name, plus named region groupings)
//! ships embedded; a file of the same shape can override it.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use store_harvest_mapping::{FieldMap, FieldSpec};

/// Embedded default country reference, covering the markets a worldwide
/// retail brand actually operates in (~88 countries).
const EMBEDDED_COUNTRIES: &str = include_str!("../data/countries.json");

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading a configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration document is not valid JSON of the right shape.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),

    /// A requested brand id is not present in the document.
    #[error("Unknown brand: {0}")]
    UnknownBrand(String),
}

/// Configuration for one brand's locator endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrandConfig {
    /// Forced endpoint pattern name (e.g. `"viewport"`); overrides
    /// classification.
    #[serde(rename = "type")]
    pub endpoint_type: Option<String>,
    /// The locator endpoint URL.
    pub url: Option<String>,
    /// Dot-separated path to the record array inside responses.
    pub data_path: Option<String>,
    /// Explicit canonical-field → source mapping. `_base_url` is
    /// reserved for partial-URL resolution.
    pub field_mapping: BTreeMap<String, serde_json::Value>,
    /// Restricts the country axis to these ISO2 → name pairs.
    pub countries: BTreeMap<String, String>,
    /// Maps ISO2 codes to the numeric ids some back ends use.
    pub country_id_map: BTreeMap<String, String>,
    /// Iterate the full reference country list instead of a custom one.
    pub use_watch_store_countries: bool,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
}

impl BrandConfig {
    /// Parses a brand configuration from a JSON string. Accepts either a
    /// bare brand object or a `{brand_id: {...}}` map (single entry, or
    /// selected by `brand_id`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the JSON is malformed or the
    /// requested brand is missing.
    pub fn from_json(json: &str, brand_id: Option<&str>) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)?;

        // A bare brand object has recognisable brand keys; a keyed map
        // has arbitrary ids whose values are objects.
        let object = value.as_object();
        let looks_bare = object.is_some_and(|map| {
            map.keys().any(|k| {
                [
                    "type",
                    "url",
                    "data_path",
                    "field_mapping",
                    "countries",
                    "headers",
                ]
                .contains(&k.as_str())
            })
        });

        if looks_bare {
            return Ok(serde_json::from_value(value)?);
        }

        let map = object.cloned().unwrap_or_default();
        match brand_id {
            Some(id) => map.get(id).map_or_else(
                || Err(ConfigError::UnknownBrand(id.to_owned())),
                |entry| Ok(serde_json::from_value(entry.clone())?),
            ),
            None => {
                if map.len() == 1 {
                    let entry = map.values().next().cloned().unwrap_or_default();
                    Ok(serde_json::from_value(entry)?)
                } else {
                    Ok(serde_json::from_value(serde_json::Value::Object(map))?)
                }
            }
        }
    }

    /// Loads brand configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on I/O or parse failure.
    pub fn from_file(path: &Path, brand_id: Option<&str>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json, brand_id)
    }

    /// Builds the explicit [`FieldMap`] from this configuration, or
    /// `None` when no field rules are present (auto-inference applies).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a field spec has an unknown shape
    /// or names an unknown transform.
    pub fn field_map(&self) -> Result<Option<FieldMap>, ConfigError> {
        let mut map = FieldMap::new();
        for (canonical, raw_spec) in &self.field_mapping {
            if canonical == "_base_url" {
                if let Some(base) = raw_spec.as_str() {
                    map.set_base_url(base);
                }
                continue;
            }
            if canonical.starts_with('_') {
                continue;
            }
            let spec: FieldSpec = serde_json::from_value(raw_spec.clone())?;
            map.insert(canonical.clone(), spec);
        }
        if map.is_empty() && map.base_url().is_none() {
            return Ok(None);
        }
        Ok(Some(map))
    }
}

/// Country reference: ISO2 code → display name, plus named regions.
#[derive(Debug, Clone, Deserialize)]
pub struct CountryReference {
    /// ISO2 code → country name.
    pub countries: BTreeMap<String, String>,
    /// Region name → ISO2 codes.
    pub regions: BTreeMap<String, Vec<String>>,
}

impl CountryReference {
    /// The embedded default reference list.
    ///
    /// # Panics
    ///
    /// Never — the embedded document is validated by tests.
    #[must_use]
    pub fn embedded() -> Self {
        serde_json::from_str(EMBEDDED_COUNTRIES).expect("embedded country reference is valid")
    }

    /// Loads a reference list from a file of the same shape.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on I/O or parse failure.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// All country names, for address-based country inference.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.countries.values().map(String::as_str).collect()
    }

    /// The ISO2 → name pairs for a region, or the full list for
    /// `"world"` / unknown regions.
    #[must_use]
    pub fn for_region(&self, region: &str) -> BTreeMap<String, String> {
        let region = region.trim().to_lowercase();
        if region.is_empty() || region == "world" {
            return self.countries.clone();
        }
        self.regions.get(&region).map_or_else(
            || {
                log::warn!("Unknown region '{region}', using full country list");
                self.countries.clone()
            },
            |codes| {
                codes
                    .iter()
                    .filter_map(|code| {
                        self.countries
                            .get(code)
                            .map(|name| (code.clone(), name.clone()))
                    })
                    .collect()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_reference_parses() {
        let reference = CountryReference::embedded();
        assert!(reference.countries.len() >= 80);
        assert_eq!(reference.countries["CH"], "Switzerland");
        assert!(reference.regions.contains_key("europe"));
    }

    #[test]
    fn region_filter_restricts_codes() {
        let reference = CountryReference::embedded();
        let europe = reference.for_region("europe");
        assert!(europe.contains_key("FR"));
        assert!(!europe.contains_key("JP"));
        let world = reference.for_region("world");
        assert_eq!(world.len(), reference.countries.len());
    }

    #[test]
    fn bare_brand_object_parses() {
        let config = BrandConfig::from_json(
            r#"{"url": "https://api.example.com/stores", "data_path": "response.entities"}"#,
            None,
        )
        .unwrap();
        assert_eq!(config.url.as_deref(), Some("https://api.example.com/stores"));
        assert_eq!(config.data_path.as_deref(), Some("response.entities"));
    }

    #[test]
    fn keyed_map_selects_brand() {
        let json = r#"{
            "acme": {"url": "https://acme.example.com/api/stores"},
            "other": {"url": "https://other.example.com/stores"}
        }"#;
        let config = BrandConfig::from_json(json, Some("acme")).unwrap();
        assert_eq!(config.url.as_deref(), Some("https://acme.example.com/api/stores"));
        assert!(BrandConfig::from_json(json, Some("missing")).is_err());
    }

    #[test]
    fn single_entry_map_needs_no_brand_id() {
        let json = r#"{"acme": {"url": "https://acme.example.com/api/stores"}}"#;
        let config = BrandConfig::from_json(json, None).unwrap();
        assert_eq!(config.url.as_deref(), Some("https://acme.example.com/api/stores"));
    }

    #[test]
    fn field_map_parses_all_spec_shapes() {
        let config = BrandConfig::from_json(
            r#"{
                "url": "https://x.example.com",
                "field_mapping": {
                    "Name": "store_name",
                    "Phone": ["phone", "telephone"],
                    "Status": {"key": "active", "default": "1", "transform": "boolean"},
                    "_base_url": "https://x.example.com/"
                }
            }"#,
            None,
        )
        .unwrap();
        let map = config.field_map().unwrap().unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.base_url(), Some("https://x.example.com/"));
        assert_eq!(map.get("Name"), Some(&FieldSpec::direct("store_name")));
    }

    #[test]
    fn empty_field_mapping_yields_none() {
        let config =
            BrandConfig::from_json(r#"{"url": "https://x.example.com"}"#, None).unwrap();
        assert!(config.field_map().unwrap().is_none());
    }
}
