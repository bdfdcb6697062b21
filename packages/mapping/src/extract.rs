//! Applying field specs to raw records, with alias-based fuzzy fallback.

use serde_json::Value;

use crate::flatten::resolve_path;
use crate::spec::FieldSpec;

/// Alias paths tried per canonical field when the mapped value comes back
/// empty. Ordered by reliability.
pub const FIELD_ALIASES: &[(&str, &[&str])] = &[
    (
        "Name",
        &[
            "name",
            "title",
            "storeName",
            "store_name",
            "establishment_name",
            "nameTranslated",
            "shortName",
        ],
    ),
    (
        "Address Line 1",
        &[
            "address",
            "address1",
            "streetAddress",
            "street_address",
            "line1",
            "adr",
            "shortAddress",
            "full_address",
            "address_line_1",
        ],
    ),
    ("Address Line 2", &["address2", "address_line_2", "street2", "line2"]),
    ("City", &["city", "cityName", "city_name", "locality"]),
    (
        "State/Province/Region",
        &[
            "state",
            "region",
            "stateName",
            "regionName",
            "province",
            "stateCode",
            "isoRegionCode",
        ],
    ),
    ("Country", &["country", "countryName", "country_name", "countryCode"]),
    (
        "Postal/ZIP Code",
        &["zip", "zipcode", "postalCode", "postal_code", "postcode"],
    ),
    (
        "Phone",
        &[
            "phone",
            "phone1",
            "phone2",
            "mainPhone",
            "telephone",
            "tel",
            "mobile",
            "dealerPhone",
        ],
    ),
    ("Email", &["email", "emails", "contact_email", "mail"]),
    (
        "Website",
        &["website", "url", "websiteUrl", "permalink", "dealerSiteUrl"],
    ),
    ("Latitude", &["lat", "latitude", "y"]),
    ("Longitude", &["lng", "lon", "longitude", "x"]),
    ("Handle", &["id", "handle", "store_id", "dealerId", "meta.id"]),
];

/// Converts an extracted JSON value to a field string.
///
/// Lists yield their first non-empty element (or up to three joined with
/// commas); objects are probed for the display-style keys APIs wrap
/// phone/email values in.
#[must_use]
pub fn normalize_field_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => {
            let non_empty: Vec<String> = items
                .iter()
                .map(normalize_field_value)
                .filter(|s| !s.is_empty())
                .collect();
            match non_empty.len() {
                0 => String::new(),
                1 => non_empty.into_iter().next().unwrap_or_default(),
                // Cap at three to avoid huge joined strings.
                _ => non_empty[..non_empty.len().min(3)].join(", "),
            }
        }
        Value::Object(map) => {
            for key in ["display", "value", "number", "raw", "formatted"] {
                if let Some(inner) = map.get(key) {
                    let s = normalize_field_value(inner);
                    if !s.is_empty() {
                        return s;
                    }
                }
            }
            map.values()
                .find_map(|v| match v {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
                    _ => None,
                })
                .unwrap_or_default()
        }
    }
}

/// Extracts a canonical field from a raw record using its spec, falling
/// back to alias-based fuzzy matching when the primary pull is empty.
#[must_use]
pub fn extract_field(record: &Value, spec: &FieldSpec, canonical: &str) -> String {
    let primary = apply_spec(record, spec);
    if !primary.is_empty() {
        return primary;
    }
    fuzzy_extract(record, canonical)
}

/// Applies a spec without any fallback.
#[must_use]
pub fn apply_spec(record: &Value, spec: &FieldSpec) -> String {
    match spec {
        FieldSpec::Direct(path) => resolve_path(record, path)
            .map(normalize_field_value)
            .unwrap_or_default(),
        FieldSpec::FirstNonEmpty(paths) => paths
            .iter()
            .filter_map(|path| resolve_path(record, path))
            .map(normalize_field_value)
            .find(|value| !value.is_empty())
            .unwrap_or_default(),
        FieldSpec::Rule {
            key,
            default,
            transform,
        } => {
            let mut value = resolve_path(record, key)
                .map(normalize_field_value)
                .unwrap_or_default();
            if value.is_empty() {
                value = default.clone();
            }
            match transform {
                Some(t) => t.apply(&value),
                None => value,
            }
        }
    }
}

/// Second-chance extraction: alias paths first, then a keyword scan over
/// the record's own keys (recursing into nested objects for contact and
/// address fields).
#[must_use]
pub fn fuzzy_extract(record: &Value, canonical: &str) -> String {
    let aliases = FIELD_ALIASES
        .iter()
        .find(|(field, _)| *field == canonical)
        .map(|(_, aliases)| *aliases)
        .unwrap_or_default();

    for alias in aliases {
        if let Some(value) = resolve_path(record, alias) {
            let s = normalize_field_value(value);
            if !s.is_empty() {
                return s;
            }
        }
    }

    keyword_scan(record, canonical, 0)
}

/// Keyword hints for fields back ends name inconsistently.
fn keywords_for(canonical: &str) -> &'static [&'static str] {
    match canonical {
        "Phone" => &["phone", "tel"],
        "Email" => &["email", "mail"],
        "Address Line 1" => &["address", "street", "line1"],
        _ => &[],
    }
}

fn keyword_scan(record: &Value, canonical: &str, depth: usize) -> String {
    let keywords = keywords_for(canonical);
    if keywords.is_empty() || depth > 2 {
        return String::new();
    }
    let Value::Object(map) = record else {
        return String::new();
    };

    for (key, value) in map {
        let key_lower = key.to_lowercase();
        if keywords.iter().any(|kw| key_lower.contains(kw)) {
            match value {
                Value::String(_) | Value::Number(_) => {
                    let s = normalize_field_value(value);
                    if !s.is_empty() {
                        return s;
                    }
                }
                _ => {}
            }
        }
    }

    // Contact fields often hide one level down (profile.mainPhone...).
    for value in map.values() {
        if value.is_object() {
            let nested = keyword_scan(value, canonical, depth + 1);
            if !nested.is_empty() {
                return nested;
            }
        }
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Transform;
    use serde_json::json;

    #[test]
    fn normalizes_lists_and_objects() {
        assert_eq!(normalize_field_value(&json!(["", "a@b.com"])), "a@b.com");
        assert_eq!(
            normalize_field_value(&json!(["a", "b", "c", "d"])),
            "a, b, c"
        );
        assert_eq!(
            normalize_field_value(&json!({"display": "+33 1 40 20 00 00"})),
            "+33 1 40 20 00 00"
        );
        assert_eq!(normalize_field_value(&json!(null)), "");
        assert_eq!(normalize_field_value(&json!(42.5)), "42.5");
    }

    #[test]
    fn direct_spec_pulls_nested_path() {
        let record = json!({"profile": {"address": {"line1": "12 High St"}}});
        let spec = FieldSpec::direct("profile.address.line1");
        assert_eq!(apply_spec(&record, &spec), "12 High St");
    }

    #[test]
    fn first_non_empty_walks_candidates() {
        let record = json!({"title": "", "name": "Boutique"});
        let spec = FieldSpec::FirstNonEmpty(vec!["title".to_owned(), "name".to_owned()]);
        assert_eq!(apply_spec(&record, &spec), "Boutique");
    }

    #[test]
    fn rule_spec_applies_default_and_transform() {
        let record = json!({});
        let spec = FieldSpec::Rule {
            key: "status".to_owned(),
            default: "yes".to_owned(),
            transform: Some(Transform::Boolean),
        };
        assert_eq!(apply_spec(&record, &spec), "TRUE");
    }

    #[test]
    fn fuzzy_fallback_finds_aliases() {
        let record = json!({"storeName": "Omega NYC"});
        let spec = FieldSpec::direct("wrong.path");
        assert_eq!(extract_field(&record, &spec, "Name"), "Omega NYC");
    }

    #[test]
    fn fuzzy_fallback_scans_nested_contact_fields() {
        let record = json!({"profile": {"mainPhoneNumber": "+1 212 555 0100"}});
        assert_eq!(fuzzy_extract(&record, "Phone"), "+1 212 555 0100");
        assert_eq!(fuzzy_extract(&record, "Email"), "");
    }
}
