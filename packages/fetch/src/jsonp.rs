//! JSONP unwrapping.
//!
//! Locator back ends from the JSONP era return bodies like
//! `SMcallback2([...])` or `callback({"stores": []})`. The parenthesised
//! region is located with a depth counter that respects string literals
//! and escapes, then parsed as plain JSON.

/// Extracts and parses the JSON inside a JSONP callback wrapper.
///
/// Returns `None` when the body is not valid JSONP.
#[must_use]
pub fn unwrap(text: &str) -> Option<serde_json::Value> {
    let text = text.trim();
    let start = text.find('(')?;

    let bytes = text.as_bytes();
    let mut depth = 1usize;
    let mut in_string = false;
    let mut escape = false;
    let mut quote = b'"';
    let mut i = start + 1;

    while i < bytes.len() {
        let c = bytes[i];
        if escape {
            escape = false;
            i += 1;
            continue;
        }
        if in_string {
            if c == b'\\' {
                escape = true;
            } else if c == quote {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            b'"' | b'\'' => {
                in_string = true;
                quote = c;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&text[start + 1..i]).ok();
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_array_callback() {
        let value = unwrap("callback([1, 2, 3])").unwrap();
        assert_eq!(value, serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn unwraps_named_callback() {
        let value = unwrap("SMcallback2({\"stores\": [{\"id\": 7}]})").unwrap();
        assert_eq!(value["stores"][0]["id"], 7);
    }

    #[test]
    fn handles_parens_inside_strings() {
        let value = unwrap(r#"cb({"name": "Store (Main)"})"#).unwrap();
        assert_eq!(value["name"], "Store (Main)");
    }

    #[test]
    fn handles_escaped_quotes() {
        let value = unwrap(r#"cb({"name": "Say \")\" loud"})"#).unwrap();
        assert_eq!(value["name"], "Say \")\" loud");
    }

    #[test]
    fn rejects_non_jsonp() {
        assert!(unwrap("<html></html>").is_none());
        assert!(unwrap("function foo() { return 1; }").is_none());
        assert!(unwrap("cb(unterminated").is_none());
    }
}
