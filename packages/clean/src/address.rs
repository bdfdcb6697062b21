//! Address-line cleanup.
//!
//! Back ends ship addresses with escaped slashes (`1\/F`), doubled
//! backslashes standing in for separators (`Mall \\ Location`), and parts
//! concatenated without spaces (`Junction500`). Many also return the full
//! address in line 1 while repeating city/state/country in their own
//! fields; [`strip_redundant_tail`] removes that duplication.

use std::sync::LazyLock;

use regex::Regex;

static WORD_THEN_DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]{2,})(\d+)").expect("valid regex"));

/// Three or more letters so ordinals (`41st`) and unit suffixes (`115A`)
/// stay glued to their number.
static DIGITS_THEN_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)([A-Za-z]{3,})").expect("valid regex"));

static BACKSLASH_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\+").expect("valid regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static SPACE_BEFORE_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,").expect("valid regex"));

static DOUBLE_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*,").expect("valid regex"));

/// Cleans an address line: fixes escape artefacts, restores missing
/// spaces between letter and digit runs, and collapses whitespace and
/// comma noise.
#[must_use]
pub fn clean_address(raw: &str) -> String {
    let mut addr = raw.trim().to_owned();
    if addr.is_empty() {
        return addr;
    }

    // Escaped forward slashes: 1\/F -> 1/F, C\/ -> C/, MA-66\/103 -> MA-66/103.
    addr = addr.replace("\\/", "/");

    // Runs of literal backslashes act as separators: "Mall \\ Location".
    addr = BACKSLASH_RUN_RE.replace_all(&addr, ", ").into_owned();

    // Junction500 -> Junction 500; 500Oxford -> 500 Oxford (ordinals and
    // short unit suffixes like 115A are left alone by the length bounds).
    addr = WORD_THEN_DIGITS_RE.replace_all(&addr, "$1 $2").into_owned();
    addr = DIGITS_THEN_WORD_RE
        .replace_all(&addr, |caps: &regex::Captures<'_>| {
            let digits = &caps[1];
            let word = &caps[2];
            if is_ordinal_prefixed(word) {
                format!("{digits}{word}")
            } else {
                format!("{digits} {word}")
            }
        })
        .into_owned();

    addr = WHITESPACE_RE.replace_all(&addr, " ").into_owned();
    addr = SPACE_BEFORE_COMMA_RE.replace_all(&addr, ",").into_owned();
    addr = DOUBLE_COMMA_RE.replace_all(&addr, ",").into_owned();

    addr.trim().to_owned()
}

/// Whether a letter run begins with an ordinal suffix (`41st`, `3rd`),
/// in which case it belongs to the number before it.
fn is_ordinal_prefixed(word: &str) -> bool {
    let lower = word.to_lowercase();
    ["st", "nd", "rd", "th"]
        .iter()
        .any(|suffix| lower.starts_with(suffix))
}

/// Strips a trailing `", <country>"`, then `", <state>[ <postal>]"`, then
/// `", <city>"` from an address line whose parts are duplicated in their
/// own fields. Case-insensitive, right-to-left, one ordered pass with
/// each part stripped at most once.
#[must_use]
pub fn strip_redundant_tail(
    addr1: &str,
    city: &str,
    state: &str,
    country: &str,
    postal: &str,
) -> String {
    let mut result = addr1.trim().to_owned();
    if result.is_empty() {
        return result;
    }

    result = strip_suffix_part(&result, country.trim());

    // State may carry the postal code after it, e.g. ", NH 1071 AZ".
    let state = state.trim();
    let postal = postal.trim();
    if !state.is_empty() && !postal.is_empty() {
        let with_postal = format!("{state} {postal}");
        let stripped = strip_suffix_part(&result, &with_postal);
        if stripped == result {
            result = strip_suffix_part(&result, state);
        } else {
            result = stripped;
        }
    } else {
        result = strip_suffix_part(&result, state);
    }

    result = strip_suffix_part(&result, city.trim());
    result
}

/// Removes a single trailing `", part"` (or `",part"`) match,
/// case-insensitively, leaving the rest of the line intact.
fn strip_suffix_part(line: &str, part: &str) -> String {
    if part.is_empty() {
        return line.to_owned();
    }
    let lower = line.to_lowercase();
    let part_lower = part.to_lowercase();
    for separator in [", ", ","] {
        let suffix = format!("{separator}{part_lower}");
        if lower.ends_with(&suffix) && line.len() > suffix.len() {
            let cut = line.len() - suffix.len();
            return line[..cut].trim_end().trim_end_matches(',').trim().to_owned();
        }
    }
    line.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixes_escaped_slashes() {
        assert_eq!(clean_address(r"1\/F Ocean Centre"), "1/F Ocean Centre");
        assert_eq!(clean_address(r"C\/ Serrano 47"), "C/ Serrano 47");
    }

    #[test]
    fn backslash_runs_become_separators() {
        assert_eq!(clean_address(r"Harbour Mall \\ Kiosk 12"), "Harbour Mall, Kiosk 12");
    }

    #[test]
    fn restores_missing_spaces() {
        assert_eq!(clean_address("Junction500"), "Junction 500");
        assert_eq!(clean_address("500Oxford Street"), "500 Oxford Street");
    }

    #[test]
    fn preserves_ordinals_and_unit_suffixes() {
        assert_eq!(clean_address("41st Street"), "41st Street");
        assert_eq!(clean_address("Shop 115A"), "Shop 115A");
        assert_eq!(clean_address("5th Avenue"), "5th Avenue");
    }

    #[test]
    fn collapses_comma_noise() {
        assert_eq!(clean_address("12 High St ,, London"), "12 High St, London");
    }

    #[test]
    fn strips_tail_in_order() {
        let stripped = strip_redundant_tail(
            "350 Fifth Ave, New York, NY, United States",
            "New York",
            "NY",
            "United States",
            "",
        );
        assert_eq!(stripped, "350 Fifth Ave");
    }

    #[test]
    fn strips_state_with_postal() {
        let stripped = strip_redundant_tail(
            "Kalverstraat 1, Amsterdam, NH 1012 NX",
            "Amsterdam",
            "NH",
            "",
            "1012 NX",
        );
        assert_eq!(stripped, "Kalverstraat 1");
    }

    #[test]
    fn leaves_unrelated_tails_alone() {
        let stripped = strip_redundant_tail("12 Rue de la Paix", "Paris", "", "France", "");
        assert_eq!(stripped, "12 Rue de la Paix");
    }

    #[test]
    fn never_strips_to_empty() {
        let stripped = strip_redundant_tail(", France", "", "", "France", "");
        assert_eq!(stripped, ", France");
    }

    #[test]
    fn strips_each_part_at_most_once() {
        // The duplicated city is stripped once, not until exhaustion.
        let stripped = strip_redundant_tail(
            "1 Queen St, Auckland, Auckland, New Zealand",
            "Auckland",
            "",
            "New Zealand",
            "",
        );
        assert_eq!(stripped, "1 Queen St, Auckland");
    }

    #[test]
    fn tail_stripping_is_idempotent() {
        let once = strip_redundant_tail(
            "350 Fifth Ave, New York, NY, United States",
            "New York",
            "NY",
            "United States",
            "",
        );
        assert_eq!(once, "350 Fifth Ave");
        let twice = strip_redundant_tail(&once, "New York", "NY", "United States", "");
        assert_eq!(once, twice);
    }
}
