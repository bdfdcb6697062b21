//! Flattening raw records into dot-path dictionaries, and the matching
//! path lookup over nested JSON.

use std::collections::BTreeMap;

use serde_json::Value;

/// Flattens a raw record into leaf paths.
///
/// Object children recurse with `parent.key` paths; lists of objects
/// expand with integer indices (`emails.0.address`); every other value
/// (scalars and scalar lists) is a leaf.
#[must_use]
pub fn flatten(record: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    if let Value::Object(map) = record {
        for (key, value) in map {
            flatten_into(value, key, &mut out);
        }
    }
    out
}

fn flatten_into(value: &Value, path: &str, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(child, &format!("{path}.{key}"), out);
            }
        }
        Value::Array(items) if items.first().is_some_and(Value::is_object) => {
            for (index, item) in items.iter().enumerate() {
                flatten_into(item, &format!("{path}.{index}"), out);
            }
        }
        _ => {
            out.insert(path.to_owned(), value.clone());
        }
    }
}

/// Resolves a dot-separated path into a nested value. Integer segments
/// index into arrays.
#[must_use]
pub fn resolve_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = record;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_nested_objects() {
        let record = json!({
            "name": "A",
            "address": {"line1": "1 Main St", "city": "NYC"}
        });
        let flat = flatten(&record);
        assert_eq!(flat["name"], json!("A"));
        assert_eq!(flat["address.line1"], json!("1 Main St"));
        assert_eq!(flat["address.city"], json!("NYC"));
    }

    #[test]
    fn expands_lists_of_objects_with_indices() {
        let record = json!({
            "emails": [{"address": "a@b.com"}, {"address": "c@d.com"}]
        });
        let flat = flatten(&record);
        assert_eq!(flat["emails.0.address"], json!("a@b.com"));
        assert_eq!(flat["emails.1.address"], json!("c@d.com"));
    }

    #[test]
    fn scalar_lists_stay_leaves() {
        let record = json!({"tags": ["a", "b"]});
        let flat = flatten(&record);
        assert_eq!(flat["tags"], json!(["a", "b"]));
    }

    #[test]
    fn resolves_paths_with_indices() {
        let record = json!({
            "profile": {"meta": {"id": "x1"}},
            "emails": ["a@b.com", "c@d.com"]
        });
        assert_eq!(resolve_path(&record, "profile.meta.id"), Some(&json!("x1")));
        assert_eq!(resolve_path(&record, "emails.1"), Some(&json!("c@d.com")));
        assert_eq!(resolve_path(&record, "profile.missing"), None);
        assert_eq!(resolve_path(&record, ""), None);
    }
}
