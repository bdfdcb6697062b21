//! HTML and control-character stripping for text fields.

use std::sync::LazyLock;

use regex::Regex;

static BR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Strips HTML markup from a text field: `<br>` variants become a space,
/// other tags are removed, bidi/formatting control code points are
/// dropped, and whitespace is collapsed.
#[must_use]
pub fn clean_html_tags(raw: &str) -> String {
    let text = raw.trim();
    if text.is_empty() {
        return String::new();
    }

    let text = BR_RE.replace_all(text, " ");
    let text = TAG_RE.replace_all(&text, "");
    let text: String = text.chars().filter(|c| !is_bidi_control(*c)).collect();
    WHITESPACE_RE.replace_all(&text, " ").trim().to_owned()
}

/// Unicode bidi and directional-formatting code points that sneak into
/// scraped text (LRM/RLM, embedding/override marks, isolates).
const fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{200E}' | '\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn br_variants_become_spaces() {
        assert_eq!(clean_html_tags("Line 1<br>Line 2"), "Line 1 Line 2");
        assert_eq!(clean_html_tags("Line 1<br/>Line 2"), "Line 1 Line 2");
        assert_eq!(clean_html_tags("Line 1<BR />Line 2"), "Line 1 Line 2");
    }

    #[test]
    fn strips_other_tags() {
        assert_eq!(clean_html_tags("<b>Omega</b> Boutique"), "Omega Boutique");
        assert_eq!(
            clean_html_tags("<span class=\"addr\">12 High St</span>"),
            "12 High St"
        );
    }

    #[test]
    fn drops_bidi_marks() {
        assert_eq!(clean_html_tags("\u{200E}Dubai Mall\u{200F}"), "Dubai Mall");
        assert_eq!(clean_html_tags("A\u{202A}B\u{2069}C"), "ABC");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(clean_html_tags("  12\n High   St "), "12 High St");
    }
}
