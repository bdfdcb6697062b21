//! Field spec shapes and the transform registry.
//!
//! Brand configuration may express a field mapping as a bare source path,
//! a list of fallback paths, or an object with a default value and a
//! named transform. No arbitrary code runs: transforms come from a closed
//! registry selected by name.

use serde::Deserialize;

/// How one canonical field is pulled out of a raw record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    /// A single dot-separated source path.
    Direct(String),
    /// Several candidate paths; the first that yields a non-empty value
    /// wins.
    FirstNonEmpty(Vec<String>),
    /// A path with a default and an optional named transform.
    Rule {
        /// Dot-separated source path.
        key: String,
        /// Value used when the path is absent or empty.
        #[serde(default)]
        default: String,
        /// Transform applied to the extracted value.
        #[serde(default)]
        transform: Option<Transform>,
    },
}

impl FieldSpec {
    /// Convenience constructor for a direct path spec.
    #[must_use]
    pub fn direct(path: &str) -> Self {
        Self::Direct(path.to_owned())
    }
}

/// Closed registry of value transforms available to configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    /// Uppercase the value.
    Upper,
    /// Lowercase the value.
    Lower,
    /// Trim surrounding whitespace.
    Trim,
    /// Map truthy/falsy spellings onto `TRUE` / `FALSE`.
    Boolean,
}

impl Transform {
    /// Applies this transform to an extracted value.
    #[must_use]
    pub fn apply(self, value: &str) -> String {
        match self {
            Self::Upper => value.to_uppercase(),
            Self::Lower => value.to_lowercase(),
            Self::Trim => value.trim().to_owned(),
            Self::Boolean => {
                let lower = value.trim().to_lowercase();
                let falsy = ["0", "false", "no", "n", "inactive", "disabled", "off", ""];
                if falsy.contains(&lower.as_str()) {
                    "FALSE".to_owned()
                } else {
                    "TRUE".to_owned()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_all_three_shapes() {
        let direct: FieldSpec = serde_json::from_value(serde_json::json!("store_name")).unwrap();
        assert_eq!(direct, FieldSpec::direct("store_name"));

        let list: FieldSpec =
            serde_json::from_value(serde_json::json!(["name", "title"])).unwrap();
        assert_eq!(
            list,
            FieldSpec::FirstNonEmpty(vec!["name".to_owned(), "title".to_owned()])
        );

        let rule: FieldSpec = serde_json::from_value(serde_json::json!({
            "key": "active",
            "default": "1",
            "transform": "boolean"
        }))
        .unwrap();
        assert_eq!(
            rule,
            FieldSpec::Rule {
                key: "active".to_owned(),
                default: "1".to_owned(),
                transform: Some(Transform::Boolean),
            }
        );
    }

    #[test]
    fn transforms_apply() {
        assert_eq!(Transform::Upper.apply("abc"), "ABC");
        assert_eq!(Transform::Lower.apply("AbC"), "abc");
        assert_eq!(Transform::Trim.apply("  x  "), "x");
        assert_eq!(Transform::Boolean.apply("no"), "FALSE");
        assert_eq!(Transform::Boolean.apply("yes"), "TRUE");
    }

    #[test]
    fn unknown_transform_is_rejected() {
        let result: Result<FieldSpec, _> = serde_json::from_value(serde_json::json!({
            "key": "x",
            "transform": "eval"
        }));
        assert!(result.is_err());
    }
}
