#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Record normalization.
//!
//! The normalizer is the single-threaded consumer at the end of every
//! harvest: it applies the field map, cleans and validates each field,
//! infers missing countries, geocodes missing coordinates, generates
//! unique handles, and deduplicates by address fingerprint. Records that
//! end up without coordinates are excluded, never silently emitted.

pub mod country;

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use store_harvest_clean::{
    clean_address, clean_coord, clean_email, clean_html_tags, clean_phone, clean_status,
    clean_url, strip_redundant_tail, Axis, UrlField,
};
use store_harvest_geocode::Geocoder;
use store_harvest_mapping::{extract_field, normalize_field_value, FieldMap};
use store_harvest_schema::{CanonicalRecord, Excluded, FingerprintSet, HandleSet};

/// Raw-record keys tried when the mapped Address Line 1 is empty.
const ADDRESS_FALLBACK_KEYS: [&str; 6] = [
    "full_address",
    "address_line_1",
    "addressLine1",
    "address1",
    "address",
    "streetAddress",
];

static NON_SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));

static SLUG_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("valid regex"));

/// What happened to one raw record.
#[derive(Debug)]
pub enum Outcome {
    /// The record normalised cleanly.
    Record(Box<CanonicalRecord>),
    /// The record was dropped; the report says why.
    Excluded(Excluded),
    /// The record duplicates one already emitted (by fingerprint).
    Duplicate,
}

/// Stateful normalizer for one harvest.
///
/// Owns the handle and fingerprint sets, so it must see every record of
/// the harvest to guarantee global uniqueness. Not shared across
/// threads — executors fan out, the normalizer drains.
pub struct Normalizer {
    field_map: FieldMap,
    geocoder: Arc<Geocoder>,
    country_names: Vec<String>,
    handles: HandleSet,
    fingerprints: FingerprintSet,
    duplicate_count: u64,
}

impl Normalizer {
    /// Creates a normalizer for one harvest.
    #[must_use]
    pub fn new(field_map: FieldMap, geocoder: Arc<Geocoder>, country_names: Vec<String>) -> Self {
        Self {
            field_map,
            geocoder,
            country_names,
            handles: HandleSet::new(),
            fingerprints: FingerprintSet::new(),
            duplicate_count: 0,
        }
    }

    /// Number of fingerprint duplicates dropped so far.
    #[must_use]
    pub const fn duplicate_count(&self) -> u64 {
        self.duplicate_count
    }

    /// Normalises one raw record.
    pub async fn normalize(&mut self, raw: &Value) -> Outcome {
        let mut record = CanonicalRecord::new();

        record.set("Name", clean_html_tags(&self.mapped(raw, "Name")));

        // Address Line 1, with the universal full-address fallback.
        let mut addr1 = clean_address(&clean_html_tags(&self.mapped(raw, "Address Line 1")));
        if addr1.is_empty()
            && let Some(object) = raw.as_object()
        {
            for key in ADDRESS_FALLBACK_KEYS {
                if let Some(Value::String(s)) = object.get(key)
                    && !s.trim().is_empty()
                {
                    addr1 = clean_address(&clean_html_tags(s));
                    if !addr1.is_empty() {
                        break;
                    }
                }
            }
        }

        record.set(
            "Address Line 2",
            clean_address(&clean_html_tags(&self.mapped(raw, "Address Line 2"))),
        );
        record.set(
            "Postal/ZIP Code",
            clean_html_tags(&self.mapped(raw, "Postal/ZIP Code")),
        );
        record.set("City", clean_html_tags(&self.mapped(raw, "City")));
        record.set(
            "State/Province/Region",
            clean_html_tags(&self.mapped(raw, "State/Province/Region")),
        );

        // Country, inferred from the address when the source omits it.
        let mut country = clean_html_tags(&self.mapped(raw, "Country"));
        if country.trim().is_empty() {
            country = country::infer_country(
                &addr1,
                record.get("City"),
                record.get("State/Province/Region"),
                &self.country_names,
            )
            .unwrap_or_default();
        }
        record.set("Country", country);

        // Drop city/state/country repeated at the end of line 1.
        let addr1 = strip_redundant_tail(
            &addr1,
            record.get("City"),
            record.get("State/Province/Region"),
            record.get("Country"),
            record.get("Postal/ZIP Code"),
        );
        record.set("Address Line 1", addr1);

        record.set("Priority", clean_html_tags(&self.mapped(raw, "Priority")));

        let base_url = self.field_map.base_url().map(str::to_owned);
        let base = base_url.as_deref();

        record.set("Status", clean_status(&self.mapped(raw, "Status")));
        record.set("Phone", clean_phone(&self.mapped(raw, "Phone")));
        record.set("Email", clean_email(&self.mapped(raw, "Email")));
        record.set(
            "Website",
            clean_url(&self.mapped(raw, "Website"), base, UrlField::Website),
        );
        record.set(
            "Image URL",
            clean_url(&self.mapped(raw, "Image URL"), base, UrlField::Other),
        );

        record.set(
            "Latitude",
            clean_coord(&self.mapped(raw, "Latitude"), Axis::Latitude),
        );
        record.set(
            "Longitude",
            clean_coord(&self.mapped(raw, "Longitude"), Axis::Longitude),
        );

        // Pass-through fields: hours, page metadata, tags, brands,
        // localized variants, custom buttons.
        for day in ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"] {
            record.set(day, self.mapped(raw, day).trim().to_owned());
        }
        for field in ["Page Title", "Page Description", "Meta Title", "Meta Description"] {
            record.set(field, self.mapped(raw, field).trim().to_owned());
        }
        record.set(" Tags", self.tags_value(raw));
        record.set("Custom Brands", self.mapped(raw, "Custom Brands").trim().to_owned());

        for prefix in ["Name", "Page Title", "Page Description", "Custom Brands"] {
            for lang in [" - FR", " - ZH-CN", " - ES"] {
                let field = format!("{prefix}{lang}");
                record.set(&field, self.mapped(raw, &field).trim().to_owned());
            }
        }

        for button in ["1", "2"] {
            let title_field = format!("Custom Button title {button}");
            record.set(&title_field, self.mapped(raw, &title_field).trim().to_owned());
            let url_field = format!("Custom Button URL {button}");
            record.set(
                &url_field,
                clean_url(&self.mapped(raw, &url_field), base, UrlField::Other),
            );
            for lang in [" - FR", " - ZH-CN", " - ES"] {
                let title_field = format!("Custom Button title {button}{lang}");
                record.set(&title_field, self.mapped(raw, &title_field).trim().to_owned());
                let url_field = format!("Custom Button URL {button}{lang}");
                record.set(
                    &url_field,
                    clean_url(&self.mapped(raw, &url_field), base, UrlField::Other),
                );
            }
        }

        // Coordinates are mandatory: geocode what is missing, exclude
        // what cannot be resolved.
        if !record.has("Latitude") || !record.has("Longitude") {
            self.geocode_into(&mut record).await;
        }
        if !record.has("Latitude") || !record.has("Longitude") {
            return Outcome::Excluded(self.excluded_report(&record));
        }

        // Handle: carry the source's when present, generate otherwise;
        // either way uniqueness is enforced against the harvest set.
        let explicit = self.mapped(raw, "Handle").trim().to_owned();
        let proposed = if explicit.is_empty() {
            generate_handle(record.get("Name"), record.get("City"))
        } else {
            explicit
        };
        let handle = self.handles.claim(&proposed);
        record.set("Handle", handle);

        if let Some(fingerprint) = record.fingerprint()
            && !self.fingerprints.insert(fingerprint)
        {
            self.duplicate_count += 1;
            log::debug!(
                "Duplicate record dropped: {} / {}",
                record.get("Name"),
                record.get("Address Line 1")
            );
            return Outcome::Duplicate;
        }

        Outcome::Record(Box::new(record))
    }

    /// Pulls a canonical field from the raw record through the field
    /// map. With no map at all, raw records are assumed to already use
    /// canonical field names (the HTML extractors produce those).
    fn mapped(&self, raw: &Value, canonical: &str) -> String {
        self.field_map.get(canonical).map_or_else(
            || {
                if self.field_map.is_empty() {
                    raw.get(canonical).map(normalize_field_value).unwrap_or_default()
                } else {
                    String::new()
                }
            },
            |spec| extract_field(raw, spec, canonical),
        )
    }

    /// Tags may be mapped under `" Tags"` or plain `"Tags"`.
    fn tags_value(&self, raw: &Value) -> String {
        let tags = self.mapped(raw, " Tags");
        if !tags.is_empty() {
            return tags.trim().to_owned();
        }
        if self.field_map.is_empty() {
            return raw.get("Tags").map(normalize_field_value).unwrap_or_default();
        }
        String::new()
    }

    async fn geocode_into(&self, record: &mut CanonicalRecord) {
        let addr1 = record.get("Address Line 1").to_owned();
        let city = record.get("City").to_owned();
        if addr1.trim().is_empty() && city.trim().is_empty() {
            return;
        }
        let point = self
            .geocoder
            .geocode(
                &addr1,
                &city,
                record.get("State/Province/Region"),
                record.get("Country"),
            )
            .await;
        if let Some(point) = point {
            record.set("Latitude", format!("{:.7}", point.lat));
            record.set("Longitude", format!("{:.7}", point.lng));
            log::debug!("Geocoded '{addr1}' to {:.4},{:.4}", point.lat, point.lng);
        }
    }

    fn excluded_report(&self, record: &CanonicalRecord) -> Excluded {
        let name = if record.has("Name") {
            record.get("Name").to_owned()
        } else {
            "Unknown".to_owned()
        };
        let address_parts: Vec<&str> = [
            record.get("Address Line 1"),
            record.get("City"),
            record.get("Country"),
        ]
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect();
        let address = if address_parts.is_empty() {
            "Address not available".to_owned()
        } else {
            address_parts.join(", ")
        };
        Excluded {
            name,
            address,
            reason: "Missing coordinates (Latitude/Longitude) - geocoding failed or insufficient address data"
                .to_owned(),
        }
    }
}

/// Generates a URL-safe handle from name and city: lowercased, non-word
/// characters dropped, separator runs collapsed to single hyphens.
#[must_use]
pub fn generate_handle(name: &str, city: &str) -> String {
    let name = if name.trim().is_empty() { "store" } else { name };
    let base = if city.trim().is_empty() {
        name.to_owned()
    } else {
        format!("{name}-{city}")
    };
    let lowered = base.to_lowercase();
    let stripped = NON_SLUG_RE.replace_all(&lowered, "");
    let slug = SLUG_SEPARATOR_RE.replace_all(&stripped, "-");
    slug.trim_matches('-').to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use store_harvest_mapping::FieldSpec;

    fn normalizer(field_map: FieldMap) -> Normalizer {
        Normalizer::new(field_map, Arc::new(Geocoder::disabled()), Vec::new())
    }

    #[test]
    fn handle_generation() {
        assert_eq!(generate_handle("A", "NYC"), "a-nyc");
        assert_eq!(generate_handle("Omega Boutique", "New York"), "omega-boutique-new-york");
        assert_eq!(generate_handle("Café & Co.", "Zürich"), "café-co-zürich");
        assert_eq!(generate_handle("", ""), "store");
    }

    #[tokio::test]
    async fn normalizes_canonical_keyed_record() {
        let raw = json!({
            "Name": "A",
            "City": "NYC",
            "Country": "USA",
            "Latitude": "40.7128",
            "Longitude": "-74.0060"
        });
        let mut normalizer = normalizer(FieldMap::new());
        let Outcome::Record(record) = normalizer.normalize(&raw).await else {
            panic!("expected record");
        };
        assert_eq!(record.get("Handle"), "a-nyc");
        assert_eq!(record.get("Latitude"), "40.7128000");
        assert_eq!(record.get("Longitude"), "-74.0060000");
        assert_eq!(record.get("Country"), "USA");
        assert_eq!(record.get("Status"), "TRUE");
    }

    #[tokio::test]
    async fn applies_field_mapping() {
        let raw = json!({
            "store_name": "Another Store",
            "street": "456 Oak Ave",
            "city_name": "Boston",
            "lat": 42.3601,
            "lng": -71.0589,
            "is_active": false
        });
        let mut map = FieldMap::new();
        map.insert("Name", FieldSpec::direct("store_name"));
        map.insert("Address Line 1", FieldSpec::direct("street"));
        map.insert("City", FieldSpec::direct("city_name"));
        map.insert("Latitude", FieldSpec::direct("lat"));
        map.insert("Longitude", FieldSpec::direct("lng"));
        map.insert("Status", FieldSpec::direct("is_active"));

        let mut normalizer = normalizer(map);
        let Outcome::Record(record) = normalizer.normalize(&raw).await else {
            panic!("expected record");
        };
        assert_eq!(record.get("Name"), "Another Store");
        assert_eq!(record.get("Address Line 1"), "456 Oak Ave");
        assert_eq!(record.get("Status"), "FALSE");
        assert_eq!(record.get("Handle"), "another-store-boston");
    }

    #[tokio::test]
    async fn excludes_record_without_coordinates() {
        let raw = json!({
            "Name": "Gone Store",
            "Address Line 1": "1 Nowhere Lane",
            "City": "Ghost Town"
        });
        let mut normalizer = normalizer(FieldMap::new());
        let Outcome::Excluded(report) = normalizer.normalize(&raw).await else {
            panic!("expected exclusion");
        };
        assert_eq!(report.name, "Gone Store");
        assert!(report.address.contains("1 Nowhere Lane"));
        assert!(report.reason.contains("Missing coordinates"));
    }

    #[tokio::test]
    async fn deduplicates_by_fingerprint() {
        let raw = json!({
            "Name": "A",
            "Address Line 1": "1 Main St",
            "City": "NYC",
            "Latitude": "40.7",
            "Longitude": "-74.0"
        });
        let mut normalizer = normalizer(FieldMap::new());
        assert!(matches!(
            normalizer.normalize(&raw).await,
            Outcome::Record(_)
        ));
        assert!(matches!(normalizer.normalize(&raw).await, Outcome::Duplicate));
        assert_eq!(normalizer.duplicate_count(), 1);
    }

    #[tokio::test]
    async fn handles_stay_unique() {
        let first = json!({
            "Name": "A", "City": "NYC",
            "Address Line 1": "1 Main St",
            "Latitude": "40.7", "Longitude": "-74.0"
        });
        let second = json!({
            "Name": "A", "City": "NYC",
            "Address Line 1": "2 Other Ave",
            "Latitude": "40.8", "Longitude": "-74.1"
        });
        let mut normalizer = normalizer(FieldMap::new());
        let Outcome::Record(a) = normalizer.normalize(&first).await else {
            panic!("expected record");
        };
        let Outcome::Record(b) = normalizer.normalize(&second).await else {
            panic!("expected record");
        };
        assert_eq!(a.get("Handle"), "a-nyc");
        assert_eq!(b.get("Handle"), "a-nyc-2");
    }

    #[tokio::test]
    async fn infers_country_and_strips_redundant_tail() {
        let raw = json!({
            "Name": "B",
            "Address Line 1": "350 Fifth Ave, New York, NY",
            "City": "New York",
            "State/Province/Region": "NY",
            "Latitude": "40.748",
            "Longitude": "-73.985"
        });
        let mut normalizer = normalizer(FieldMap::new());
        let Outcome::Record(record) = normalizer.normalize(&raw).await else {
            panic!("expected record");
        };
        assert_eq!(record.get("Country"), "United States");
        assert_eq!(record.get("Address Line 1"), "350 Fifth Ave");
    }

    #[tokio::test]
    async fn duplicated_tail_segment_is_stripped_once() {
        let raw = json!({
            "Name": "C",
            "Address Line 1": "1 Queen St, Auckland, Auckland",
            "City": "Auckland",
            "Latitude": "-36.8485",
            "Longitude": "174.7633"
        });
        let mut normalizer = normalizer(FieldMap::new());
        let Outcome::Record(record) = normalizer.normalize(&raw).await else {
            panic!("expected record");
        };
        assert_eq!(record.get("Country"), "New Zealand");
        // The repeated city is stripped once, leaving one occurrence.
        assert_eq!(record.get("Address Line 1"), "1 Queen St, Auckland");
    }

    #[tokio::test]
    async fn normalization_is_idempotent() {
        let raw = json!({
            "Handle": "a-nyc",
            "Name": "A",
            "Address Line 1": "1 Main St",
            "City": "NYC",
            "Country": "USA",
            "Latitude": "40.7128000",
            "Longitude": "-74.0060000",
            "Status": "TRUE"
        });
        let mut first_pass = normalizer(FieldMap::new());
        let Outcome::Record(once) = first_pass.normalize(&raw).await else {
            panic!("expected record");
        };

        // Feed the normalised record back through a fresh normalizer.
        let mut as_value = serde_json::Map::new();
        for field in store_harvest_schema::CANONICAL_SCHEMA {
            as_value.insert(field.to_owned(), json!(once.get(field)));
        }
        let mut second_pass = normalizer(FieldMap::new());
        let Outcome::Record(twice) = second_pass.normalize(&Value::Object(as_value)).await
        else {
            panic!("expected record");
        };
        assert_eq!(*once, *twice);
    }
}
