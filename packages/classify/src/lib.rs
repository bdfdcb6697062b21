#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Endpoint classification.
//!
//! Given an opaque store-locator URL (and optionally a sampled response),
//! decide how the back end wants to be driven: one call, pages, viewport
//! rectangles, radius searches, or country filters — or HTML extraction
//! when the endpoint serves a page instead of data.
//!
//! Classification is heuristic and never fatal: a low-confidence `Single`
//! profile is a legal outcome the orchestrator proceeds with.

use std::collections::BTreeMap;

use url::Url;

/// The interaction pattern of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointPattern {
    /// One call returns everything.
    Single,
    /// Full list split across pages.
    Paginated,
    /// Bounding-box queries; needs grid expansion.
    Viewport,
    /// Radius-around-a-point queries; needs multi-center expansion.
    Radius,
    /// Country/region filter; needs country iteration.
    Country,
    /// An HTML page with embedded store data.
    HtmlEmbedded,
}

impl EndpointPattern {
    /// Stable lowercase name, used in logs and the CLI `--type` flag.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Paginated => "paginated",
            Self::Viewport => "viewport",
            Self::Radius => "radius",
            Self::Country => "country",
            Self::HtmlEmbedded => "html_embedded",
        }
    }

    /// Parses a pattern name (for forced overrides).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "single" | "single_call" => Some(Self::Single),
            "paginated" | "pagination" => Some(Self::Paginated),
            "viewport" => Some(Self::Viewport),
            "radius" | "radius_search" => Some(Self::Radius),
            "country" | "country_filter" => Some(Self::Country),
            "html_embedded" | "html" => Some(Self::HtmlEmbedded),
            _ => None,
        }
    }

    /// Rough number of calls needed to cover the world, for reporting.
    #[must_use]
    pub const fn estimated_calls_world(self) -> Option<u32> {
        match self {
            Self::Single | Self::HtmlEmbedded => Some(1),
            Self::Viewport => Some(720),
            Self::Country => Some(195),
            Self::Radius => Some(2000),
            Self::Paginated => None,
        }
    }

    /// Whether this pattern only ever answers for a limited region and
    /// therefore needs expansion.
    #[must_use]
    pub const fn is_region_specific(self) -> bool {
        matches!(self, Self::Viewport | Self::Radius | Self::Country)
    }
}

/// How a paginated endpoint advances between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaginationStyle {
    /// No pagination observed.
    #[default]
    None,
    /// Page-number parameter.
    Page,
    /// Offset/limit parameters.
    Offset,
    /// Opaque continuation token.
    Token,
}

/// Classifier output.
#[derive(Debug, Clone)]
pub struct EndpointProfile {
    /// Best-guess interaction pattern.
    pub pattern: EndpointPattern,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Query parameters observed on the URL.
    pub observed_params: BTreeMap<String, String>,
    /// Pagination style detected from the URL/response.
    pub pagination_style: PaginationStyle,
    /// Whether the endpoint appears to answer for a limited region.
    pub region_specific: bool,
    /// Indicator tokens that drove the decision.
    pub indicators: Vec<String>,
}

/// Indicator tokens per candidate pattern. Scoring: a parameter hit
/// counts 1.0, a path hit 0.5.
const VIEWPORT_INDICATORS: [&str; 8] = [
    "viewport",
    "bounds",
    "bbox",
    "ne_lat",
    "sw_lat",
    "northeast",
    "southwest",
    "by_viewport",
];
const COUNTRY_INDICATORS: [&str; 5] =
    ["country", "countrycode", "country-region", "region", "regioncode"];
const RADIUS_INDICATORS: [&str; 3] = ["radius", "distance", "r"];
const PAGINATED_INDICATORS: [&str; 7] =
    ["page", "limit", "offset", "per", "per_page", "skip", "take"];
const ZIP_INDICATORS: [&str; 3] = ["zip", "zipcode", "postal"];
const CITY_SEARCH_INDICATORS: [&str; 6] = ["city", "location", "address", "search", "q", "query"];

/// Common page caps that suggest a truncated (region-limited) response.
const COMMON_PAGE_CAPS: [usize; 6] = [10, 25, 50, 100, 250, 500];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Candidate {
    Viewport,
    Country,
    Radius,
    Paginated,
    ZipSearch,
    CitySearch,
}

/// Classifies an endpoint from its URL and an optional sampled response.
#[must_use]
pub fn classify(url: &str, sample: Option<&serde_json::Value>, sample_is_html: bool) -> EndpointProfile {
    let observed_params = parse_params(url);
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_default();

    let mut scores: BTreeMap<Candidate, (f64, Vec<String>)> = BTreeMap::new();
    let candidates: [(Candidate, &[&str]); 6] = [
        (Candidate::Viewport, &VIEWPORT_INDICATORS),
        (Candidate::Country, &COUNTRY_INDICATORS),
        (Candidate::Radius, &RADIUS_INDICATORS),
        (Candidate::Paginated, &PAGINATED_INDICATORS),
        (Candidate::ZipSearch, &ZIP_INDICATORS),
        (Candidate::CitySearch, &CITY_SEARCH_INDICATORS),
    ];

    for (candidate, indicators) in candidates {
        let mut score = 0.0;
        let mut matched = Vec::new();
        for indicator in indicators {
            // Single-letter indicators (`r`, `q`) only count as exact
            // parameter names; as substrings they would match anything.
            let short = indicator.len() <= 1;
            let param_hit = observed_params.keys().any(|k| {
                let key = k.to_lowercase();
                if short { key == *indicator } else { key.contains(indicator) }
            });
            if param_hit {
                score += 1.0;
                matched.push((*indicator).to_owned());
            }
            if !short && path.contains(indicator) {
                score += 0.5;
                if !matched.contains(&(*indicator).to_owned()) {
                    matched.push((*indicator).to_owned());
                }
            }
        }
        if score > 0.0 {
            scores.insert(candidate, (score, matched));
        }
    }

    // First candidate in declaration order wins ties.
    let mut best: Option<(Candidate, f64, Vec<String>)> = None;
    for (candidate, (score, matched)) in &scores {
        if best.as_ref().is_none_or(|(_, s, _)| *score > *s) {
            best = Some((*candidate, *score, matched.clone()));
        }
    }

    // `offset` beside `q` means a paginated search API, not a city
    // search.
    if let Some((Candidate::CitySearch, _, _)) = best
        && observed_params.contains_key("offset")
        && let Some((score, matched)) = scores.get(&Candidate::Paginated)
    {
        best = Some((Candidate::Paginated, *score, matched.clone()));
    }

    let (pattern, confidence, mut indicators) = match best {
        Some((candidate, score, matched)) => {
            let pattern = resolve_candidate(candidate, &observed_params, &matched);
            (pattern, (score / 2.0).min(1.0), matched)
        }
        None if sample_is_html => (EndpointPattern::HtmlEmbedded, 0.6, Vec::new()),
        None => (EndpointPattern::Single, 0.7, Vec::new()),
    };

    // A parameterless URL that served HTML is an embedded page even if
    // some path token scored.
    let pattern = if sample_is_html && observed_params.is_empty() {
        EndpointPattern::HtmlEmbedded
    } else {
        pattern
    };

    let mut pagination_style = pagination_style_from_params(&observed_params);
    let mut region_specific = pattern.is_region_specific();

    if let Some(sample) = sample {
        let clues = analyze_response(sample);
        if clues.pagination_style != PaginationStyle::None {
            pagination_style = clues.pagination_style;
        }
        if clues.region_limited {
            region_specific = true;
            indicators.push("region_limited_response".to_owned());
        }
    }

    log::debug!(
        "Classified {url} as {} (confidence {confidence:.2})",
        pattern.name()
    );

    EndpointProfile {
        pattern,
        confidence,
        observed_params,
        pagination_style,
        region_specific,
        indicators,
    }
}

/// Maps internal scoring candidates onto public patterns. ZIP search is
/// detected but impractical (~42k codes for the US alone), so it
/// degrades to a low-confidence single call; city search degrades to
/// paginated or single.
fn resolve_candidate(
    candidate: Candidate,
    params: &BTreeMap<String, String>,
    matched: &[String],
) -> EndpointPattern {
    match candidate {
        Candidate::Viewport => EndpointPattern::Viewport,
        Candidate::Country => EndpointPattern::Country,
        Candidate::Radius => EndpointPattern::Radius,
        Candidate::Paginated => EndpointPattern::Paginated,
        Candidate::ZipSearch => {
            log::warn!(
                "ZIP-search endpoint detected ({}); iteration is impractical, treating as single",
                matched.join(", ")
            );
            EndpointPattern::Single
        }
        Candidate::CitySearch => {
            if params.contains_key("offset") {
                EndpointPattern::Paginated
            } else {
                EndpointPattern::Single
            }
        }
    }
}

fn parse_params(url: &str) -> BTreeMap<String, String> {
    Url::parse(url)
        .map(|u| {
            u.query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

fn pagination_style_from_params(params: &BTreeMap<String, String>) -> PaginationStyle {
    let keys_lower: Vec<String> = params.keys().map(|k| k.to_lowercase()).collect();
    if keys_lower.iter().any(|k| k.contains("token")) {
        PaginationStyle::Token
    } else if keys_lower.iter().any(|k| k == "offset") {
        PaginationStyle::Offset
    } else if keys_lower
        .iter()
        .any(|k| k.contains("page") || k == "limit" || k == "per")
    {
        PaginationStyle::Page
    } else {
        PaginationStyle::None
    }
}

#[derive(Debug, Default)]
struct ResponseClues {
    pagination_style: PaginationStyle,
    region_limited: bool,
}

/// Heuristics over a sampled JSON response: pagination markers and
/// signs that only a regional slice came back.
fn analyze_response(sample: &serde_json::Value) -> ResponseClues {
    let mut clues = ResponseClues::default();

    let records = sample_records(sample);
    let returned = records.map_or(0, <[serde_json::Value]>::len);

    if let Some(object) = sample.as_object() {
        if object.contains_key("pageToken")
            || object.keys().any(|k| k.to_lowercase().contains("token"))
        {
            clues.pagination_style = PaginationStyle::Token;
        } else if object.contains_key("offset") || object.contains_key("per") {
            clues.pagination_style = PaginationStyle::Offset;
        } else if ["page", "total", "has_more", "next"]
            .iter()
            .any(|k| object.contains_key(*k))
        {
            clues.pagination_style = PaginationStyle::Page;
        }

        let total = ["total", "total_count", "count"]
            .iter()
            .find_map(|k| object.get(*k))
            .and_then(serde_json::Value::as_u64);
        if let Some(total) = total
            && total != returned as u64
        {
            clues.region_limited = true;
        }
    }

    if returned > 0 {
        if COMMON_PAGE_CAPS.contains(&returned) {
            clues.region_limited = true;
        }
        if returned < 20 {
            clues.region_limited = true;
        }
    }

    clues
}

/// Finds the record list in a sampled response body.
fn sample_records(sample: &serde_json::Value) -> Option<&[serde_json::Value]> {
    if let Some(array) = sample.as_array() {
        return Some(array);
    }
    let object = sample.as_object()?;
    for key in ["data", "results", "items", "stores", "locations", "dealers", "retailers"] {
        if let Some(array) = object.get(key).and_then(serde_json::Value::as_array) {
            return Some(array);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn viewport_urls_classify_as_viewport() {
        let profile = classify(
            "https://retailers.example.com/app/establishments/by_viewport/light?northEastLat=49&northEastLng=2&southWestLat=48&southWestLng=1",
            None,
            false,
        );
        assert_eq!(profile.pattern, EndpointPattern::Viewport);
        assert!(profile.region_specific);
    }

    #[test]
    fn viewport_param_lifts_viewport_score() {
        let base = classify("https://api.example.com/stores?brand=X", None, false);
        let with_viewport = classify(
            "https://api.example.com/stores?brand=X&bbox=1,2,3,4",
            None,
            false,
        );
        assert_ne!(base.pattern, EndpointPattern::Viewport);
        assert_eq!(with_viewport.pattern, EndpointPattern::Viewport);
    }

    #[test]
    fn country_filter_detected() {
        let profile = classify(
            "https://www.example.com/api/stores?countryCode=US",
            None,
            false,
        );
        assert_eq!(profile.pattern, EndpointPattern::Country);
    }

    #[test]
    fn offset_beside_q_prefers_paginated() {
        let profile = classify(
            "https://api.example.com/search?q=paris&offset=0&per=50",
            None,
            false,
        );
        assert_eq!(profile.pattern, EndpointPattern::Paginated);
        assert_eq!(profile.pagination_style, PaginationStyle::Offset);
    }

    #[test]
    fn parameterless_url_defaults_to_single() {
        let profile = classify("https://www.example.com/stores.json", None, false);
        assert_eq!(profile.pattern, EndpointPattern::Single);
        assert!((profile.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn html_sample_on_plain_url_is_html_embedded() {
        let profile = classify("https://www.example.com/find-a-boutique", None, true);
        assert_eq!(profile.pattern, EndpointPattern::HtmlEmbedded);
    }

    #[test]
    fn token_pagination_detected_from_response() {
        let sample = json!({"stores": [], "pageToken": "abc"});
        let profile = classify(
            "https://api.example.com/stores?page=1",
            Some(&sample),
            false,
        );
        assert_eq!(profile.pagination_style, PaginationStyle::Token);
    }

    #[test]
    fn capped_response_looks_region_limited() {
        let records: Vec<serde_json::Value> =
            (0..50).map(|i| json!({"id": i})).collect();
        let sample = json!({"results": records});
        let profile = classify("https://api.example.com/stores", Some(&sample), false);
        assert!(profile.region_specific);
    }

    #[test]
    fn zip_search_degrades_to_single() {
        let profile = classify(
            "https://api.example.com/stores?zipcode=10001",
            None,
            false,
        );
        assert_eq!(profile.pattern, EndpointPattern::Single);
    }

    #[test]
    fn pattern_parse_accepts_legacy_names() {
        assert_eq!(
            EndpointPattern::parse("country_filter"),
            Some(EndpointPattern::Country)
        );
        assert_eq!(EndpointPattern::parse("single_call"), Some(EndpointPattern::Single));
        assert_eq!(EndpointPattern::parse("bogus"), None);
    }
}
