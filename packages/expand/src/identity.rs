//! Source-identity keys for in-stream deduplication.
//!
//! Multi-call executors see the same store from overlapping cells, pages,
//! and radius circles. The identity key is the first non-empty of:
//! `profile.meta.id`, top-level `id`, `meta.id`, a lowercased
//! `name|address1|city` fingerprint, and finally `name|lat|lng`.

use serde_json::Value;

/// Derives the deduplication key for a raw record, or `None` when
/// nothing identifying can be found.
#[must_use]
pub fn source_identity(record: &Value) -> Option<String> {
    let object = record.as_object()?;

    for path in ["profile.meta.id", "id", "meta.id"] {
        if let Some(id) = lookup_string(record, path)
            && !id.is_empty()
        {
            return Some(id);
        }
    }

    let profile = object.get("profile").and_then(Value::as_object);

    let name = object
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| profile.and_then(|p| p.get("name").and_then(Value::as_str)))
        .unwrap_or("")
        .trim()
        .to_lowercase();

    let address = profile
        .and_then(|p| p.get("address"))
        .or_else(|| object.get("address"))
        .and_then(Value::as_object)
        .and_then(|a| a.get("line1"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if !name.is_empty() && !address.is_empty() {
        let city = profile
            .and_then(|p| p.get("address"))
            .or_else(|| object.get("address"))
            .and_then(Value::as_object)
            .and_then(|a| a.get("city"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_lowercase();
        return Some(format!("{name}|{address}|{city}"));
    }

    if !name.is_empty() {
        let coords = coordinate_pair(record);
        if let Some((lat, lng)) = coords {
            return Some(format!("{name}|{lat}|{lng}"));
        }
    }

    None
}

/// Reads a dot-path string (or number, stringified) from a record.
fn lookup_string(record: &Value, path: &str) -> Option<String> {
    let mut current = record;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    match current {
        Value::String(s) => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Display coordinates for the last-resort identity rung.
fn coordinate_pair(record: &Value) -> Option<(String, String)> {
    let candidates = [
        "profile.geocodedCoordinate.lat",
        "profile.yextDisplayCoordinate.lat",
        "lat",
        "latitude",
    ];
    let lng_for = |lat_path: &str| lat_path.replace("lat", "long").replace("latitude", "longitude");

    for lat_path in candidates {
        if let Some(lat) = lookup_number(record, lat_path) {
            for lng_path in [
                lng_for(lat_path),
                lat_path.replace("lat", "lng"),
                "lng".to_owned(),
                "longitude".to_owned(),
            ] {
                if let Some(lng) = lookup_number(record, &lng_path) {
                    return Some((lat, lng));
                }
            }
        }
    }
    None
}

fn lookup_number(record: &Value, path: &str) -> Option<String> {
    let mut current = record;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    match current {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_profile_meta_id() {
        let record = json!({
            "id": "fallback",
            "profile": {"meta": {"id": "primary"}}
        });
        assert_eq!(source_identity(&record).as_deref(), Some("primary"));
    }

    #[test]
    fn falls_back_to_top_level_id() {
        let record = json!({"id": 42, "name": "X"});
        assert_eq!(source_identity(&record).as_deref(), Some("42"));
    }

    #[test]
    fn name_address_city_fingerprint() {
        let record = json!({
            "name": "Boutique",
            "address": {"line1": "1 Main St", "city": "NYC"}
        });
        assert_eq!(
            source_identity(&record).as_deref(),
            Some("boutique|1 main st|nyc")
        );
    }

    #[test]
    fn name_and_coordinates_as_last_resort() {
        let record = json!({"name": "Boutique", "lat": 40.7, "lng": -74.0});
        assert_eq!(
            source_identity(&record).as_deref(),
            Some("boutique|40.7|-74.0")
        );
    }

    #[test]
    fn unidentifiable_record_yields_none() {
        assert_eq!(source_identity(&json!({"foo": "bar"})), None);
        assert_eq!(source_identity(&json!("not an object")), None);
    }
}
