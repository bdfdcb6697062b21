//! Contact-field validators: phone, email, URL, and status flags.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid regex")
});

static PHONE_CHAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d+\-()xX\s]").expect("valid regex"));

static LOCALE_HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}-[a-z]{2}$").expect("valid regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

const IMAGE_EXTENSIONS: [&str; 7] = [".png", ".jpg", ".jpeg", ".gif", ".webp", ".bmp", ".svg"];

/// Which canonical field a URL is being validated for. Store pages
/// (`Website`) must not point at image files; image and button URLs may.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlField {
    /// The `Website` column — image URLs are rejected.
    Website,
    /// Any other URL column (`Image URL`, custom button URLs).
    Other,
}

/// Normalises a phone number by dropping everything except digits,
/// `+-()`, extension markers, and spaces.
#[must_use]
pub fn clean_phone(raw: &str) -> String {
    let stripped = PHONE_CHAR_RE.replace_all(raw.trim(), "");
    WHITESPACE_RE.replace_all(stripped.trim(), " ").into_owned()
}

/// Lowercases and validates an email address, returning the empty
/// string when it does not look like one.
#[must_use]
pub fn clean_email(raw: &str) -> String {
    let email = raw.trim().to_lowercase();
    if EMAIL_RE.is_match(&email) { email } else { String::new() }
}

/// Maps a raw status value onto `"TRUE"` / `"FALSE"`. Unknown values
/// default to active.
#[must_use]
pub fn clean_status(raw: &str) -> String {
    let value = raw.trim().to_lowercase();
    let falsy = ["0", "false", "no", "n", "inactive", "disabled", "off"];
    if falsy.contains(&value.as_str()) {
        "FALSE".to_owned()
    } else {
        "TRUE".to_owned()
    }
}

/// Validates and normalises a URL.
///
/// Missing schemes default to `https://`. Partial URLs (path-only, a
/// dotless host, or a locale code like `en-us` sitting where the host
/// should be) are resolved against `base_url` when one is supplied.
/// Image URLs are rejected for the [`UrlField::Website`] field. Returns
/// the empty string when no absolute URL can be produced.
#[must_use]
pub fn clean_url(raw: &str, base_url: Option<&str>, field: UrlField) -> String {
    let mut url_str = raw.trim().replace("\\/", "/").replace('\\', "/");
    if url_str.is_empty() {
        return String::new();
    }

    if !has_scheme(&url_str) {
        url_str = format!("https://{url_str}");
    }

    if let Some(base) = base_url
        && is_partial(&url_str)
        && let Some(resolved) = resolve_against_base(&url_str, base)
    {
        url_str = resolved;
    }

    let Ok(parsed) = Url::parse(&url_str) else {
        return String::new();
    };
    let Some(host) = parsed.host_str() else {
        return String::new();
    };
    if host.is_empty() {
        return String::new();
    }

    if field == UrlField::Website && is_image_url(&parsed) {
        return String::new();
    }

    url_str
}

fn has_scheme(url_str: &str) -> bool {
    Url::parse(url_str).is_ok_and(|u| !u.scheme().is_empty())
}

/// A URL is partial when its host is not a real domain: no dot, or a
/// locale code (`en-us`) that is really the first path segment.
fn is_partial(url_str: &str) -> bool {
    let Ok(parsed) = Url::parse(url_str) else {
        return true;
    };
    let Some(host) = parsed.host_str() else {
        return true;
    };
    let host = host.to_lowercase();
    !host.contains('.') || LOCALE_HOST_RE.is_match(&host)
}

/// Re-roots a partial URL under the brand's base URL, treating a
/// dotless host as the leading path segment.
fn resolve_against_base(url_str: &str, base: &str) -> Option<String> {
    let base = Url::parse(&format!("{}/", base.trim_end_matches('/'))).ok()?;
    let partial = Url::parse(url_str).ok()?;

    let mut path_part = match partial.host_str() {
        Some(host) if !host.contains('.') => {
            format!("{host}{}", partial.path())
        }
        _ => partial.path().trim_start_matches('/').to_owned(),
    };
    if let Some(query) = partial.query() {
        path_part = format!("{path_part}?{query}");
    }

    base.join(&path_part).ok().map(Into::into)
}

/// Whether the last path segment carries an image extension. Substring
/// hits like `store-locator-jpg-guide.html` do not count.
fn is_image_url(url: &Url) -> bool {
    let path = url.path().trim_end_matches('/');
    let last_segment = path.rsplit('/').next().unwrap_or("").to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| last_segment.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_keeps_valid_characters() {
        assert_eq!(clean_phone("(555) 123-4567"), "(555) 123-4567");
        assert_eq!(clean_phone("+1-555-123-4567 x12"), "+1-555-123-4567 x12");
        assert_eq!(clean_phone("555.123.4567"), "5551234567");
    }

    #[test]
    fn phone_labels_collapse_to_empty() {
        assert_eq!(clean_phone("PHONE ORDER"), "");
    }

    #[test]
    fn email_is_lowercased_and_validated() {
        assert_eq!(clean_email(" Paris@Example.COM "), "paris@example.com");
        assert_eq!(clean_email("not-an-email"), "");
        assert_eq!(clean_email("a@b"), "");
    }

    #[test]
    fn status_maps_falsy_values() {
        assert_eq!(clean_status("0"), "FALSE");
        assert_eq!(clean_status("Inactive"), "FALSE");
        assert_eq!(clean_status("off"), "FALSE");
        assert_eq!(clean_status("1"), "TRUE");
        assert_eq!(clean_status(""), "TRUE");
        assert_eq!(clean_status("whatever"), "TRUE");
    }

    #[test]
    fn url_gets_default_scheme() {
        assert_eq!(
            clean_url("www.omegawatches.com/stores", None, UrlField::Website),
            "https://www.omegawatches.com/stores"
        );
    }

    #[test]
    fn locale_host_resolves_against_base() {
        let resolved = clean_url(
            "https://en-us/storelocator/new-york",
            Some("https://www.bulgari.com"),
            UrlField::Website,
        );
        assert_eq!(resolved, "https://www.bulgari.com/en-us/storelocator/new-york");
    }

    #[test]
    fn partial_without_base_is_rejected() {
        assert_eq!(clean_url("/stores/ny", None, UrlField::Website), "");
    }

    #[test]
    fn website_rejects_image_urls() {
        assert_eq!(
            clean_url("https://cdn.example.com/store.jpg", None, UrlField::Website),
            ""
        );
        assert_eq!(
            clean_url("https://cdn.example.com/store.jpg", None, UrlField::Other),
            "https://cdn.example.com/store.jpg"
        );
        assert_eq!(
            clean_url(
                "https://example.com/store-locator-jpg-guide.html",
                None,
                UrlField::Website
            ),
            "https://example.com/store-locator-jpg-guide.html"
        );
    }

    #[test]
    fn escaped_slashes_are_fixed() {
        assert_eq!(
            clean_url(r"https:\/\/www.example.com\/store", None, UrlField::Website),
            "https://www.example.com/store"
        );
    }
}
