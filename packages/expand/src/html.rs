//! HTML-embedded store extraction.
//!
//! Three ladders, tried in order, richest result kept:
//!
//! 1. Regex over embedded JSON for objects carrying
//!    `name + cityName/countryName + latitude + longitude`.
//! 2. `<script type="application/json">` blocks: parse, descend, and
//!    collect the biggest list whose first element is store-shaped.
//! 3. Generic card extraction: containers whose text smells like an
//!    address, a heading for the name, paragraph siblings for address
//!    lines, and coordinates from the first maps link.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};

static EMBEDDED_STORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#""name":"([^"]+)"[^}]*?"cityName":"([^"]*)"[^}]*?"countryName":"([^"]+)"[^}]*?"latitude":([^,]+),"longitude":([^,}]+)"#,
    )
    .expect("valid regex")
});

static CONTEXT_FIELD_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("Address Line 1", r#""streetAddress":"([^"]*)""#),
        ("Address Line 1", r#""address":"([^"]*)""#),
        ("Address Line 1", r#""adr":"([^"]*)""#),
        ("Postal/ZIP Code", r#""postalCode":"([^"]*)""#),
        ("Postal/ZIP Code", r#""zipcode":"([^"]*)""#),
        ("State/Province/Region", r#""stateName":"([^"]*)""#),
        ("Handle", r#""id":"([^"]*)""#),
        ("Phone", r#""phone":"([^"]*)""#),
        ("Email", r#""email":"([^"]*)""#),
        ("Website", r#""websiteUrl":"([^"]*)""#),
    ]
    .into_iter()
    .map(|(field, pattern)| (field, Regex::new(pattern).expect("valid regex")))
    .collect()
});

static ADDRESS_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d|street|st\.|ave|road|rd\.|boulevard|blvd|suite|floor|no\.|n°")
        .expect("valid regex")
});

static MAPS_LINK_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"destination=(-?[\d.]+),(-?[\d.]+)",
        r"@(-?[\d.]+),(-?[\d.]+)",
        r"!3d(-?[\d.]+)!4d(-?[\d.]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static ZIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4,6}(?:-\d{4})?)\b").expect("valid regex"));

/// Per-ladder extraction quality.
#[derive(Debug, Clone, Default)]
pub struct ExtractionMetrics {
    /// Records the ladder produced.
    pub total: usize,
    /// Share of critical fields populated, 0–100.
    pub completeness_score: f64,
}

const CRITICAL_FIELDS: [&str; 8] = [
    "Name",
    "Phone",
    "Email",
    "Address Line 1",
    "City",
    "Country",
    "Latitude",
    "Longitude",
];

/// Scores how complete a ladder's records are.
#[must_use]
pub fn extraction_metrics(stores: &[Value]) -> ExtractionMetrics {
    if stores.is_empty() {
        return ExtractionMetrics::default();
    }
    let filled: usize = stores
        .iter()
        .map(|store| {
            CRITICAL_FIELDS
                .iter()
                .filter(|field| {
                    store
                        .get(**field)
                        .and_then(Value::as_str)
                        .is_some_and(|v| !v.trim().is_empty())
                })
                .count()
        })
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let score = filled as f64 / (stores.len() * CRITICAL_FIELDS.len()) as f64 * 100.0;
    ExtractionMetrics {
        total: stores.len(),
        completeness_score: score,
    }
}

/// Runs all three ladders and keeps the richest result.
#[must_use]
pub fn extract_stores(html: &str) -> Vec<Value> {
    let (stores, _) = extract_with_metrics(html);
    stores
}

/// Runs all three ladders, returning the richest result plus per-ladder
/// metrics for reporting.
#[must_use]
pub fn extract_with_metrics(html: &str) -> (Vec<Value>, BTreeMap<&'static str, ExtractionMetrics>) {
    let mut metrics = BTreeMap::new();
    let mut best: Vec<Value> = Vec::new();
    let mut best_rank = (0usize, 0.0f64);

    for (name, stores) in [
        ("regex_embedded", extract_regex_embedded(html)),
        ("script_json", extract_script_json(html)),
        ("generic_cards", extract_cards(html)),
    ] {
        let m = extraction_metrics(&stores);
        let rank = (m.total, m.completeness_score);
        log::debug!(
            "HTML ladder {name}: {} stores, completeness {:.1}%",
            m.total,
            m.completeness_score
        );
        metrics.insert(name, m);
        if rank.0 > best_rank.0 || (rank.0 == best_rank.0 && rank.1 > best_rank.1) {
            best = stores;
            best_rank = rank;
        }
    }

    (best, metrics)
}

// ── Ladder 1: regex over embedded JSON ───────────────────────────

fn extract_regex_embedded(html: &str) -> Vec<Value> {
    let mut stores = Vec::new();

    for captures in EMBEDDED_STORE_RE.captures_iter(html) {
        let Some(full) = captures.get(0) else { continue };
        let context_start = full.start().saturating_sub(500);
        let context_end = (full.end() + 500).min(html.len());
        let context = slice_at_char_boundaries(html, context_start, context_end);

        let mut store = json!({
            "Name": captures.get(1).map_or("", |m| m.as_str()),
            "City": captures.get(2).map_or("", |m| m.as_str()),
            "Country": captures.get(3).map_or("", |m| m.as_str()),
            "Latitude": captures.get(4).map_or("", |m| m.as_str()).trim_matches('"'),
            "Longitude": captures.get(5).map_or("", |m| m.as_str()).trim_matches('"'),
        });

        // Pull secondary fields from the surrounding context window.
        if let Some(object) = store.as_object_mut() {
            for (field, pattern) in CONTEXT_FIELD_PATTERNS.iter() {
                if object
                    .get(*field)
                    .and_then(Value::as_str)
                    .is_some_and(|v| !v.is_empty())
                {
                    continue;
                }
                if let Some(m) = pattern.captures(context).and_then(|c| c.get(1)) {
                    object.insert((*field).to_owned(), json!(m.as_str()));
                }
            }
        }

        stores.push(store);
    }

    stores
}

/// Clamps a byte range onto char boundaries before slicing.
fn slice_at_char_boundaries(text: &str, mut start: usize, mut end: usize) -> &str {
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}

// ── Ladder 2: application/json script blocks ─────────────────────

/// Key hints used to map discovered store objects onto canonical
/// fields. Deliberately simpler than the full inferencer: script blocks
/// are small and one shallow pass is enough.
const KEY_HINTS: [(&str, &[&str]); 12] = [
    ("Name", &["name", "title", "store"]),
    ("Address Line 1", &["address", "street", "adr", "line1"]),
    ("City", &["city", "locality"]),
    ("State/Province/Region", &["state", "region", "province"]),
    ("Country", &["country"]),
    ("Postal/ZIP Code", &["zip", "postal", "postcode"]),
    ("Phone", &["phone", "tel", "mobile"]),
    ("Email", &["email", "mail"]),
    ("Website", &["website", "url", "permalink"]),
    ("Latitude", &["lat", "latitude"]),
    ("Longitude", &["lng", "lon", "longitude"]),
    ("Handle", &["id", "handle"]),
];

fn extract_script_json(html: &str) -> Vec<Value> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse("script[type='application/json']").expect("valid selector");

    let mut best: Vec<Value> = Vec::new();
    for script in document.select(&selector) {
        let text: String = script.text().collect();
        let Ok(data) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let mut arrays = Vec::new();
        collect_store_arrays(&data, &mut arrays);
        for array in arrays {
            if array.len() > best.len() {
                let mapping = infer_key_hints(&array);
                if !mapping.is_empty() {
                    best = array
                        .iter()
                        .map(|store| project_store(store, &mapping))
                        .collect();
                }
            }
        }
    }
    best
}

fn collect_store_arrays(value: &Value, out: &mut Vec<Vec<Value>>) {
    match value {
        Value::Array(items) => {
            if items.first().is_some_and(is_store_shaped) {
                out.push(items.clone());
            }
            for item in items {
                collect_store_arrays(item, out);
            }
        }
        Value::Object(map) => {
            for child in map.values() {
                collect_store_arrays(child, out);
            }
        }
        _ => {}
    }
}

/// An object is store-shaped when at least two of the telltale keys
/// appear somewhere in its key set.
fn is_store_shaped(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    let joined = object
        .keys()
        .map(|k| k.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let hits = ["address", "lat", "lng", "latitude", "longitude", "city", "name"]
        .iter()
        .filter(|needle| joined.contains(**needle))
        .count();
    hits >= 2
}

/// Maps canonical fields to the shortest matching key path in the
/// sampled objects.
fn infer_key_hints(array: &[Value]) -> BTreeMap<&'static str, String> {
    let mut all_keys = BTreeSet::new();
    for store in array.iter().take(5) {
        collect_keys(store, "", &mut all_keys);
    }

    let mut mapping = BTreeMap::new();
    for (canonical, hints) in KEY_HINTS {
        let mut best: Option<&String> = None;
        for key in &all_keys {
            let lower = key.to_lowercase();
            if hints.iter().any(|hint| lower.contains(hint))
                && best.is_none_or(|b| key.len() < b.len())
            {
                best = Some(key);
            }
        }
        if let Some(key) = best {
            mapping.insert(canonical, key.clone());
        }
    }
    mapping
}

fn collect_keys(value: &Value, prefix: &str, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                out.insert(path.clone());
                collect_keys(child, &path, out);
            }
        }
        Value::Array(items) => {
            if let Some(first) = items.first() {
                collect_keys(first, prefix, out);
            }
        }
        _ => {}
    }
}

fn project_store(store: &Value, mapping: &BTreeMap<&'static str, String>) -> Value {
    let mut out = serde_json::Map::new();
    for (canonical, path) in mapping {
        let mut current = Some(store);
        for segment in path.split('.') {
            current = current.and_then(|v| v.get(segment));
        }
        let text = match current {
            Some(Value::String(s)) => s.trim().to_owned(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Array(items)) => items
                .first()
                .map(|v| match v {
                    Value::String(s) => s.trim().to_owned(),
                    other => other.to_string(),
                })
                .unwrap_or_default(),
            _ => String::new(),
        };
        out.insert((*canonical).to_owned(), json!(text));
    }
    Value::Object(out)
}

// ── Ladder 3: generic card extraction ────────────────────────────

fn extract_cards(html: &str) -> Vec<Value> {
    let document = Html::parse_document(html);
    let container_selector = Selector::parse("div, section, article").expect("valid selector");
    let heading_selector = Selector::parse("h2, h3, h4").expect("valid selector");
    let paragraph_selector = Selector::parse("p").expect("valid selector");
    let link_selector = Selector::parse("a[href]").expect("valid selector");

    let mut stores = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for element in document.select(&container_selector) {
        let Some(store) = parse_card(
            element,
            &heading_selector,
            &paragraph_selector,
            &link_selector,
        ) else {
            continue;
        };

        let has_location = store
            .get("Address Line 1")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
            || store
                .get("City")
                .and_then(Value::as_str)
                .is_some_and(|s| !s.is_empty());
        if !has_location {
            continue;
        }

        let text: String = element.text().collect::<Vec<_>>().join(" ");
        let has_zip = store
            .get("Postal/ZIP Code")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !ADDRESS_HINT_RE.is_match(&text) && !has_zip {
            continue;
        }

        let key = (
            store
                .get("Name")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_owned(),
            store
                .get("Address Line 1")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_owned(),
        );
        if seen.insert(key) {
            stores.push(store);
        }
    }

    // One card could be anything; two or more confirm a listing.
    if stores.len() < 2 {
        return Vec::new();
    }
    stores
}

fn parse_card(
    card: ElementRef<'_>,
    heading_selector: &Selector,
    paragraph_selector: &Selector,
    link_selector: &Selector,
) -> Option<Value> {
    let heading = card.select(heading_selector).next()?;
    let name = element_text(heading);
    if name.len() < 2 || name.len() > 120 {
        return None;
    }

    let mut store = serde_json::Map::new();
    store.insert("Name".to_owned(), json!(name));

    let paragraphs: Vec<String> = card
        .select(paragraph_selector)
        .map(element_text)
        .collect();

    if let Some(addr1) = paragraphs.first() {
        store.insert("Address Line 1".to_owned(), json!(addr1));
    }
    if let Some(city_line) = paragraphs.get(1) {
        let city = city_line
            .split(',')
            .next()
            .unwrap_or(city_line)
            .trim()
            .to_owned();
        store.insert("City".to_owned(), json!(city));

        let parts: Vec<&str> = city_line.splitn(3, ',').map(str::trim).collect();
        if let Some(state_part) = parts.get(1) {
            let state = ZIP_RE.replace(state_part, "").trim().to_owned();
            if !state.is_empty() {
                store.insert("State/Province/Region".to_owned(), json!(state));
            }
        }
        if let Some(zip) = ZIP_RE.captures(city_line).and_then(|c| c.get(1)) {
            store.insert("Postal/ZIP Code".to_owned(), json!(zip.as_str()));
        }
    }
    if let Some(country) = paragraphs.get(2) {
        store.insert("Country".to_owned(), json!(country));
    }

    // Coordinates from the first maps-style link in the card.
    for link in card.select(link_selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if let Some((lat, lng)) = MAPS_LINK_RES
            .iter()
            .find_map(|re| re.captures(href))
            .and_then(|c| Some((c.get(1)?.as_str().to_owned(), c.get(2)?.as_str().to_owned())))
        {
            store.insert("Latitude".to_owned(), json!(lat));
            store.insert("Longitude".to_owned(), json!(lng));
            break;
        }
    }

    Some(Value::Object(store))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_owned()
}
