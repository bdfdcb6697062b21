//! Locating the record array inside a response body.
//!
//! Back ends wrap their store lists in wildly different envelopes. An
//! explicit `data_path` from brand configuration wins; otherwise the
//! common nested paths are walked, then the flat container keys.

use serde_json::Value;

/// Nested container paths tried before the flat keys.
const NESTED_PATHS: [&str; 6] = [
    "response.entities",
    "response.data",
    "response.results",
    "response.stores",
    "data.stores",
    "data.results",
];

/// Flat container keys, in the order they are tried.
const FLAT_KEYS: [&str; 9] = [
    "entities",
    "data",
    "results",
    "items",
    "stores",
    "locations",
    "dealers",
    "retailers",
    "features",
];

/// Finds the record array in a response body.
///
/// `data_path` (dot-separated) is honoured when supplied; otherwise a
/// bare array is returned as-is and wrapped objects are probed along
/// the known container paths.
#[must_use]
pub fn find_record_array(body: &Value, data_path: Option<&str>) -> Option<Vec<Value>> {
    if let Some(path) = data_path.filter(|p| !p.trim().is_empty()) {
        return resolve(body, path).and_then(Value::as_array).cloned();
    }

    if let Some(array) = body.as_array() {
        return Some(array.clone());
    }

    for path in NESTED_PATHS {
        if let Some(array) = resolve(body, path).and_then(Value::as_array) {
            return Some(array.clone());
        }
    }

    let object = body.as_object()?;
    for key in FLAT_KEYS {
        if let Some(array) = object.get(key).and_then(Value::as_array) {
            return Some(array.clone());
        }
    }

    None
}

/// The declared total record count in a response envelope, if any.
#[must_use]
pub fn declared_total(body: &Value) -> Option<u64> {
    let object = body.as_object()?;
    let envelope = object
        .get("response")
        .and_then(Value::as_object)
        .unwrap_or(object);
    for key in ["count", "total", "totalCount", "total_count"] {
        if let Some(total) = envelope.get(key).and_then(Value::as_u64) {
            return Some(total);
        }
    }
    None
}

fn resolve<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = body;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_array_is_returned() {
        let body = json!([{"id": 1}]);
        assert_eq!(find_record_array(&body, None).unwrap().len(), 1);
    }

    #[test]
    fn nested_path_is_found() {
        let body = json!({"response": {"entities": [{"id": 1}, {"id": 2}]}});
        assert_eq!(find_record_array(&body, None).unwrap().len(), 2);
    }

    #[test]
    fn flat_key_is_found() {
        let body = json!({"stores": [{"id": 1}]});
        assert_eq!(find_record_array(&body, None).unwrap().len(), 1);
    }

    #[test]
    fn explicit_data_path_wins() {
        let body = json!({"payload": {"list": [{"id": 1}]}, "stores": []});
        let records = find_record_array(&body, Some("payload.list")).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn missing_container_yields_none() {
        assert!(find_record_array(&json!({"message": "ok"}), None).is_none());
    }

    #[test]
    fn declared_totals() {
        assert_eq!(declared_total(&json!({"response": {"count": 12}})), Some(12));
        assert_eq!(declared_total(&json!({"total": 7})), Some(7));
        assert_eq!(declared_total(&json!({"stores": []})), None);
    }
}
