//! Field-map inference from sample records.
//!
//! Given a few raw records from an unknown back end, derive which source
//! paths hold each canonical field. Coordinates and City get dedicated
//! ladders (their false positives are the costly ones — a city-center
//! coordinate silently misplaces every store); everything else runs an
//! alias-pattern pass and then a token-similarity fallback.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::spec::FieldSpec;
use crate::FieldMap;

/// How many sample records inference looks at.
pub const MAX_SAMPLES: usize = 3;

/// Fields accepted when present in at least this share of samples.
const MIN_PRESENCE_OPTIONAL: f64 = 0.3;

/// Fields that may be sparse in real data.
const OPTIONAL_FIELDS: [&str; 2] = ["Phone", "Email"];

/// Alias patterns per canonical field, in reliability order. A pattern
/// matches a flattened key exactly or as a `.pattern` suffix, so
/// `mainPhone.display` also matches `profile.mainPhone.display`.
const FIELD_PATTERNS: &[(&str, &[&str])] = &[
    (
        "Name",
        &["name", "nameTranslated", "shortName", "establishment_name", "title"],
    ),
    (
        "Address Line 1",
        &[
            "streetAddress",
            "shortAddress",
            "address",
            "address1",
            "address.line1",
            "address.street",
        ],
    ),
    ("Address Line 2", &["address2", "address.line2", "address.street2"]),
    (
        "State/Province/Region",
        &[
            "regionName",
            "state",
            "province",
            "region",
            "stateCode",
            "address.region",
            "address.state",
        ],
    ),
    (
        "Country",
        &[
            "countryName",
            "country",
            "countryCode",
            "address.countryCode",
            "address.country",
        ],
    ),
    (
        "Postal/ZIP Code",
        &["postalCode", "zipCode", "zip", "postal", "postcode", "address.postalCode"],
    ),
    (
        "Phone",
        &[
            "mainPhone.display",
            "mainPhone.number",
            "phone1",
            "phone",
            "phoneNumber",
            "mainPhone",
            "telephone",
        ],
    ),
    ("Email", &["emails.0", "emails", "email", "contact_email"]),
    ("Website", &["website", "url", "permalink"]),
    ("Handle", &["id", "meta.id", "profile.meta.id"]),
];

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new("[a-z]+").expect("valid regex"));

/// Infers a field map from up to [`MAX_SAMPLES`] sample records.
///
/// Deterministic for a fixed sample set: candidate keys are walked in a
/// fully ordered ranking, so repeated inference returns the same map.
#[must_use]
pub fn infer_field_map(samples: &[Value]) -> FieldMap {
    let samples = &samples[..samples.len().min(MAX_SAMPLES)];
    let flats: Vec<BTreeMap<String, Value>> = samples.iter().map(crate::flatten).collect();
    if flats.is_empty() {
        return FieldMap::new();
    }

    let all_keys: BTreeSet<String> = flats.iter().flat_map(|f| f.keys().cloned()).collect();

    let mut map = FieldMap::new();

    for axis in [CoordAxis::Latitude, CoordAxis::Longitude] {
        if let Some(path) = detect_coordinate(&flats, &all_keys, axis) {
            map.insert(axis.canonical(), FieldSpec::Direct(path));
        }
    }

    if let Some(path) = detect_city(&flats, &all_keys) {
        map.insert("City", FieldSpec::Direct(path));
    }

    for (canonical, patterns) in FIELD_PATTERNS {
        let min_matches = min_presence(canonical, flats.len());
        if let Some(path) = detect_by_patterns(&flats, &all_keys, canonical, patterns, min_matches)
            .or_else(|| detect_by_similarity(&flats, &all_keys, canonical, min_matches))
        {
            map.insert(*canonical, FieldSpec::Direct(path));
        }
    }

    log::debug!("Inferred field map with {} fields", map.len());
    map
}

fn min_presence(canonical: &str, sample_count: usize) -> usize {
    if OPTIONAL_FIELDS.contains(&canonical) {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let threshold = (sample_count as f64 * MIN_PRESENCE_OPTIONAL).floor() as usize;
        threshold.max(1)
    } else {
        sample_count
    }
}

// ── Coordinate ladder ────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum CoordAxis {
    Latitude,
    Longitude,
}

impl CoordAxis {
    const fn canonical(self) -> &'static str {
        match self {
            Self::Latitude => "Latitude",
            Self::Longitude => "Longitude",
        }
    }

    const fn suffixes(self) -> &'static [&'static str] {
        match self {
            Self::Latitude => &[".lat", ".latitude"],
            Self::Longitude => &[".lng", ".long", ".longitude", ".lon"],
        }
    }

    const fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Latitude => &["lat", "latitude"],
            Self::Longitude => &["lng", "longitude", "lon", "long"],
        }
    }

    const fn range(self) -> (f64, f64) {
        match self {
            Self::Latitude => (-90.0, 90.0),
            Self::Longitude => (-180.0, 180.0),
        }
    }
}

/// Store-coordinate context terms, best first. `cityCoordinate` is the
/// trap: it is the city center, not the store.
const COORD_PRIORITY_TERMS: [&str; 6] = [
    "geocodedcoordinate",
    "yextdisplaycoordinate",
    "displaycoordinate",
    "coordinate",
    "geocode",
    "location",
];
const COORD_CONTEXT_TERMS: [&str; 6] =
    ["coordinate", "geocode", "location", "geo", "position", "point"];
const COORD_EXCLUDE_TERM: &str = "citycoordinate";

fn detect_coordinate(
    flats: &[BTreeMap<String, Value>],
    all_keys: &BTreeSet<String>,
    axis: CoordAxis,
) -> Option<String> {
    let mut best: Option<(f64, String)> = None;

    // Strategy 1: paths ending with a coordinate suffix, ranked so
    // store-coordinate containers come before generic and excluded ones.
    let mut ranked: Vec<&String> = all_keys.iter().collect();
    ranked.sort_by_key(|key| {
        let lower = key.to_lowercase();
        let excluded = lower.contains(COORD_EXCLUDE_TERM);
        let priority = COORD_PRIORITY_TERMS.iter().any(|t| lower.contains(t)) && !excluded;
        (!priority, excluded, key.len(), (*key).clone())
    });

    for key in &ranked {
        let lower = key.to_lowercase();
        if !axis.suffixes().iter().any(|s| lower.ends_with(s)) {
            continue;
        }
        let Some(value) = coordinate_value(flats, key, axis) else {
            continue;
        };
        if is_boolean_like(value) && !has_coordinate_context(&lower) {
            continue;
        }
        let score = if lower.contains("geocodedcoordinate")
            || lower.contains("yextdisplaycoordinate")
        {
            1.0
        } else if lower.contains(COORD_EXCLUDE_TERM) {
            0.5
        } else {
            0.9
        };
        if best.as_ref().is_none_or(|(s, _)| score > *s) {
            best = Some((score, (*key).clone()));
        }
    }
    if let Some((_, key)) = best {
        return Some(key);
    }

    // Strategy 2: coordinate keyword anywhere in the path.
    let mut ranked: Vec<&String> = all_keys.iter().collect();
    ranked.sort_by_key(|key| {
        let lower = key.to_lowercase();
        let priority = COORD_CONTEXT_TERMS.iter().any(|t| lower.contains(t));
        let keyword = axis.keywords().iter().any(|k| lower.contains(k));
        (!priority, !keyword, key.len(), (*key).clone())
    });

    let mut best: Option<(f64, String)> = None;
    for key in &ranked {
        let lower = key.to_lowercase();
        if !axis.keywords().iter().any(|k| lower.contains(k)) {
            continue;
        }
        let has_context = COORD_CONTEXT_TERMS.iter().any(|t| lower.contains(t));
        let Some(value) = coordinate_value(flats, key, axis) else {
            continue;
        };
        if is_boolean_like(value) && !has_context {
            continue;
        }
        let score = if has_context { 0.8 } else { 0.6 };
        if best.as_ref().is_none_or(|(s, _)| score > *s) {
            best = Some((score, (*key).clone()));
        }
    }
    if let Some((_, key)) = best {
        return Some(key);
    }

    // Strategy 3: any in-range number living in a coordinate-context
    // path that the keyword pass did not cover.
    for key in all_keys {
        let lower = key.to_lowercase();
        if !COORD_CONTEXT_TERMS.iter().any(|t| lower.contains(t)) {
            continue;
        }
        if axis.keywords().iter().any(|k| lower.contains(k)) {
            continue;
        }
        let Some(value) = coordinate_value(flats, key, axis) else {
            continue;
        };
        if is_boolean_like(value) {
            continue;
        }
        return Some(key.clone());
    }

    None
}

/// The key's numeric value in the first sample, when the key is present
/// in every sample and the value parses inside the axis range.
fn coordinate_value(
    flats: &[BTreeMap<String, Value>],
    key: &str,
    axis: CoordAxis,
) -> Option<f64> {
    if !present_in_all(flats, key) {
        return None;
    }
    let value = numeric(flats.first()?.get(key)?)?;
    let (min, max) = axis.range();
    (value.is_finite() && value >= min && value <= max).then_some(value)
}

fn has_coordinate_context(lower: &str) -> bool {
    const TERMS: [&str; 8] = [
        "coordinate",
        "geocode",
        "location",
        "geo",
        "lat",
        "lng",
        "long",
        "lon",
    ];
    TERMS.iter().any(|t| lower.contains(t))
}

/// Exactly 0 or 1 — usually a flag, not a coordinate.
fn is_boolean_like(value: f64) -> bool {
    value == 0.0 || value == 1.0
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ── City ladder ──────────────────────────────────────────────────

const CITY_PRIORITY_PATHS: [&str; 4] = ["address.city", "city", "cityname", "address.cityname"];
const CITY_EXCLUDE_SUFFIXES: [&str; 8] = [
    ".lat",
    ".lng",
    ".latitude",
    ".longitude",
    ".long",
    ".lon",
    ".coord",
    ".coordinate",
];

fn detect_city(
    flats: &[BTreeMap<String, Value>],
    all_keys: &BTreeSet<String>,
) -> Option<String> {
    // Strategy 1: exact priority paths.
    for path in CITY_PRIORITY_PATHS {
        if present_in_all(flats, path)
            && flats
                .first()
                .and_then(|f| f.get(path))
                .is_some_and(is_city_like)
        {
            return Some(path.to_owned());
        }
    }

    // Strategy 2: any key containing "city", excluding coordinate paths.
    let mut ranked: Vec<&String> = all_keys.iter().collect();
    ranked.sort_by_key(|key| {
        let lower = key.to_lowercase();
        let priority = CITY_PRIORITY_PATHS.iter().any(|p| lower.contains(p));
        let in_address = lower.contains("address");
        (!priority, !in_address, key.len(), (*key).clone())
    });

    let mut best: Option<(f64, String)> = None;
    for key in &ranked {
        let lower = key.to_lowercase();
        if !lower.contains("city") {
            continue;
        }
        if CITY_EXCLUDE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
            continue;
        }
        if (lower.contains("coordinate") || lower.contains("geocode"))
            && (lower.contains("lat") || lower.contains("lng") || lower.contains("long"))
        {
            continue;
        }
        if !present_in_all(flats, key) {
            continue;
        }
        if !flats.first().and_then(|f| f.get(*key)).is_some_and(is_city_like) {
            continue;
        }
        let score = if lower.contains("address") { 0.9 } else { 0.7 };
        if best.as_ref().is_none_or(|(s, _)| score > *s) {
            best = Some((score, (*key).clone()));
        }
    }
    best.map(|(_, key)| key)
}

/// A city value is a non-empty, non-numeric string.
fn is_city_like(value: &Value) -> bool {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return false;
            }
            let digits_only: String = trimmed.replace(['.', '-'], "");
            !digits_only.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

// ── Generic fields ───────────────────────────────────────────────

fn detect_by_patterns(
    flats: &[BTreeMap<String, Value>],
    all_keys: &BTreeSet<String>,
    canonical: &str,
    patterns: &[&str],
    min_matches: usize,
) -> Option<String> {
    for pattern in patterns {
        let mut best: Option<(usize, String)> = None;
        for key in keys_matching_pattern(all_keys, pattern) {
            let presence = presence_count(flats, &key);
            if presence < min_matches {
                continue;
            }
            if !value_gate(flats, &key, canonical) {
                continue;
            }
            if best.as_ref().is_none_or(|(p, _)| presence > *p) {
                best = Some((presence, key));
            }
        }
        if let Some((_, key)) = best {
            return Some(key);
        }
    }
    None
}

fn detect_by_similarity(
    flats: &[BTreeMap<String, Value>],
    all_keys: &BTreeSet<String>,
    canonical: &str,
    min_matches: usize,
) -> Option<String> {
    let mut best: Option<(f64, usize, String)> = None;
    for key in all_keys {
        let score = field_similarity(canonical, key);
        if score < 0.6 {
            continue;
        }
        let presence = presence_count(flats, key);
        if presence < min_matches {
            continue;
        }
        if !value_gate(flats, key, canonical) {
            continue;
        }
        let better = best
            .as_ref()
            .is_none_or(|(s, p, _)| score > *s || (score == *s && presence > *p));
        if better {
            best = Some((score, presence, key.clone()));
        }
    }
    best.map(|(_, _, key)| key)
}

/// Phone and Email candidates must hold a plausible value in at least
/// one sample — labels like `"PHONE ORDER"` are not phone numbers.
fn value_gate(flats: &[BTreeMap<String, Value>], key: &str, canonical: &str) -> bool {
    if canonical != "Phone" && canonical != "Email" {
        return true;
    }
    let Some(sample) = flats
        .iter()
        .find_map(|f| f.get(key).filter(|v| !v.is_null()))
    else {
        return false;
    };
    match canonical {
        "Phone" => looks_like_phone(sample),
        _ => looks_like_email(sample),
    }
}

/// Whether a value looks like a real phone number rather than a label.
#[must_use]
pub fn looks_like_phone(value: &Value) -> bool {
    if let Value::Array(items) = value {
        return items.first().is_some_and(looks_like_phone);
    }
    let s = crate::extract::normalize_field_value(value);
    if s.is_empty() {
        return false;
    }
    let digit_count = s.chars().filter(char::is_ascii_digit).count();
    if digit_count < 5 {
        return false;
    }
    let lower = s.to_lowercase();
    !["phone order", "read more", "click", "contact us"]
        .iter()
        .any(|label| lower.contains(label))
}

/// Whether a value looks like an email address (and not a URL or label).
#[must_use]
pub fn looks_like_email(value: &Value) -> bool {
    if let Value::Array(items) = value {
        return items.first().is_some_and(looks_like_email);
    }
    let s = crate::extract::normalize_field_value(value);
    if s.len() < 5 || s.contains(' ') || s.starts_with("http") {
        return false;
    }
    match s.rsplit_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

/// Keys matching a pattern exactly or as a `.pattern` suffix, with `_`
/// treated as `.` on both sides. Sorted shortest-first so top-level keys
/// beat deeply nested copies.
fn keys_matching_pattern(all_keys: &BTreeSet<String>, pattern: &str) -> Vec<String> {
    let pattern_norm = pattern.to_lowercase().replace('_', ".");
    let mut matches: Vec<String> = all_keys
        .iter()
        .filter(|key| {
            let key_norm = key.to_lowercase().replace('_', ".");
            key_norm == pattern_norm || key_norm.ends_with(&format!(".{pattern_norm}"))
        })
        .cloned()
        .collect();
    matches.sort_by_key(|k| (k.len(), k.clone()));
    matches
}

/// Token-set similarity between a canonical field name and a candidate
/// key: 1.0 exact, 0.9 subset, Jaccard overlap otherwise, 0.7 substring.
#[must_use]
pub fn field_similarity(canonical: &str, candidate: &str) -> f64 {
    let canonical_norm = canonical
        .to_lowercase()
        .replace([' ', '/', '-'], "");
    let candidate_norm = candidate.to_lowercase().replace(['_', '.', '-'], "");

    if canonical_norm == candidate_norm {
        return 1.0;
    }

    let canonical_parts: BTreeSet<&str> = TOKEN_RE
        .find_iter(&canonical_norm)
        .map(|m| m.as_str())
        .collect();
    let candidate_parts: BTreeSet<&str> = TOKEN_RE
        .find_iter(&candidate_norm)
        .map(|m| m.as_str())
        .collect();

    if canonical_parts.is_subset(&candidate_parts) || candidate_parts.is_subset(&canonical_parts)
    {
        return 0.9;
    }

    let overlap = canonical_parts.intersection(&candidate_parts).count();
    if overlap > 0 {
        let total = canonical_parts.union(&candidate_parts).count();
        #[allow(clippy::cast_precision_loss)]
        return overlap as f64 / total as f64;
    }

    if canonical_norm.contains(&candidate_norm) || candidate_norm.contains(&canonical_norm) {
        return 0.7;
    }

    0.0
}

fn present_in_all(flats: &[BTreeMap<String, Value>], key: &str) -> bool {
    presence_count(flats, key) == flats.len()
}

fn presence_count(flats: &[BTreeMap<String, Value>], key: &str) -> usize {
    flats
        .iter()
        .filter(|f| f.get(key).is_some_and(|v| !v.is_null()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn yext_sample() -> Value {
        json!({
            "name": "Boutique Geneva",
            "profile": {
                "address": {"line1": "Rue du Rhône 1", "city": "Geneva"},
                "meta": {"id": "ch-001"},
                "cityCoordinate": {"lat": 46.2044, "long": 6.1432},
                "geocodedCoordinate": {"lat": 46.2038, "long": 6.1450},
                "mainPhone": {"display": "+41 22 000 00 00"}
            }
        })
    }

    #[test]
    fn prefers_geocoded_over_city_coordinate() {
        let map = infer_field_map(&[yext_sample()]);
        let FieldSpec::Direct(lat_path) = map.get("Latitude").unwrap() else {
            panic!("expected direct spec");
        };
        assert_eq!(lat_path, "profile.geocodedCoordinate.lat");
        let FieldSpec::Direct(lng_path) = map.get("Longitude").unwrap() else {
            panic!("expected direct spec");
        };
        assert_eq!(lng_path, "profile.geocodedCoordinate.long");
    }

    #[test]
    fn finds_city_through_priority_paths() {
        let map = infer_field_map(&[json!({"address": {"city": "Paris"}, "name": "X"})]);
        assert_eq!(map.get("City"), Some(&FieldSpec::direct("address.city")));
    }

    #[test]
    fn rejects_numeric_city_values() {
        let map = infer_field_map(&[json!({"city": "12345", "name": "X"})]);
        assert_eq!(map.get("City"), None);
    }

    #[test]
    fn phone_label_is_rejected() {
        let sample = json!({
            "name": "X",
            "phone": "PHONE ORDER",
            "telephone": "+1 212 555 0100"
        });
        let map = infer_field_map(&[sample]);
        assert_eq!(map.get("Phone"), Some(&FieldSpec::direct("telephone")));
    }

    #[test]
    fn nested_pattern_matches_via_suffix() {
        let map = infer_field_map(&[yext_sample()]);
        assert_eq!(
            map.get("Phone"),
            Some(&FieldSpec::direct("profile.mainPhone.display"))
        );
        assert_eq!(
            map.get("Handle"),
            Some(&FieldSpec::direct("profile.meta.id"))
        );
    }

    #[test]
    fn mandatory_fields_require_full_presence() {
        let samples = [
            json!({"name": "A", "lat": 1.5, "lng": 2.5}),
            json!({"title": "B", "lat": 3.5, "lng": 4.5}),
        ];
        let map = infer_field_map(&samples);
        // "name" is missing from the second sample, "title" from the
        // first; neither pattern covers both samples so similarity
        // cannot rescue it either.
        assert_eq!(map.get("Name"), None);
    }

    #[test]
    fn optional_fields_accept_partial_presence() {
        let samples = [
            json!({"name": "A", "email": "a@b.com", "lat": 1.5, "lng": 2.5}),
            json!({"name": "B", "lat": 3.5, "lng": 4.5}),
            json!({"name": "C", "lat": 5.5, "lng": 6.5}),
        ];
        let map = infer_field_map(&samples);
        assert_eq!(map.get("Email"), Some(&FieldSpec::direct("email")));
    }

    #[test]
    fn boolean_like_values_need_coordinate_context() {
        // A bare `lat` holding exactly 1.0 is more likely a flag.
        let bare = [json!({"name": "A", "lat": 1.0, "lng": 2.5})];
        assert_eq!(infer_field_map(&bare).get("Latitude"), None);

        // The same value inside a coordinate container is accepted.
        let nested = [json!({"name": "A", "location": {"lat": 1.0, "lng": 2.5}})];
        assert_eq!(
            infer_field_map(&nested).get("Latitude"),
            Some(&FieldSpec::direct("location.lat"))
        );
    }

    #[test]
    fn inference_is_stable() {
        let samples = [yext_sample(), yext_sample()];
        let first = infer_field_map(&samples);
        let second = infer_field_map(&samples);
        assert_eq!(first, second);
    }

    #[test]
    fn similarity_scores() {
        assert!((field_similarity("Address Line 1", "addressline1") - 1.0).abs() < 1e-9);
        assert!(field_similarity("Website", "website_url") >= 0.6);
        assert!(field_similarity("Name", "opening_hours") < 0.6);
    }
}
