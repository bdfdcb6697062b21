#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! HTTP fetching for store-locator endpoints.
//!
//! One operation: [`Fetcher::fetch`], a GET with retry/backoff that
//! returns either parsed JSON or the raw body text. JSONP responses
//! (`callback([...])`) are unwrapped transparently, and API-looking URLs
//! that come back as HTML are retried once with an explicit
//! `Accept: application/json` to coax JSON out of content-negotiating
//! back ends.

pub mod jsonp;

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Number of retries after the initial attempt.
pub const DEFAULT_RETRIES: u32 = 3;

/// Desktop browser User-Agent most locator back ends expect.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Status codes worth retrying (throttling and transient server errors).
const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Errors that can occur while fetching.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The HTTP request failed at the transport level.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A header key or value from configuration was malformed.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

/// A fetched response body.
#[derive(Debug, Clone)]
pub enum Payload {
    /// The body parsed as JSON (directly or via JSONP unwrap).
    Json(serde_json::Value),
    /// The body as text — usually an HTML page.
    Text(String),
}

impl Payload {
    /// Returns the JSON value when this payload is JSON.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// Returns the body text when this payload is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Text(text) => Some(text),
        }
    }

    /// Whether this payload is (unwrapped) JSON.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }
}

/// HTTP fetcher with retry/backoff and content negotiation.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    headers: BTreeMap<String, String>,
    retries: u32,
}

impl Fetcher {
    /// Creates a fetcher with default timeout and retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the underlying client cannot be built.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_headers(&BTreeMap::new())
    }

    /// Creates a fetcher that sends the given headers on every request.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the client cannot be built.
    pub fn with_headers(headers: &BTreeMap<String, String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            headers: headers.clone(),
            retries: DEFAULT_RETRIES,
        })
    }

    /// Overrides the retry count.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Fetches a URL, returning JSON when the body parses (directly or as
    /// JSONP) and text otherwise.
    ///
    /// Transport errors and retryable statuses are retried with
    /// exponential backoff (2, 4, 8 seconds). A 4xx after retries is not
    /// an error here — the body comes back as [`Payload::Text`] for the
    /// caller to inspect.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] only when every attempt failed at the
    /// transport level.
    pub async fn fetch(&self, url: &str) -> Result<Payload, FetchError> {
        let payload = self.fetch_once(url, &self.headers).await?;

        // API-looking URLs that answer with HTML often just need an
        // explicit Accept header; re-issue once.
        if looks_api_like(url)
            && !self.headers.contains_key("Accept")
            && matches!(&payload, Payload::Text(text) if looks_like_html(text))
        {
            log::debug!("HTML from API-like URL, retrying with Accept: application/json");
            let mut headers = self.headers.clone();
            headers.insert("Accept".to_owned(), "application/json".to_owned());
            let renegotiated = self.fetch_once(url, &headers).await?;
            if renegotiated.is_json() {
                return Ok(renegotiated);
            }
        }

        Ok(payload)
    }

    /// One fetch (with retries), no content negotiation.
    async fn fetch_once(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<Payload, FetchError> {
        let header_map = build_header_map(headers)?;
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..=self.retries {
            if attempt > 0 {
                let wait = Duration::from_secs(1u64 << attempt);
                log::warn!(
                    "Retry attempt {attempt}/{} after {}s: {url}",
                    self.retries,
                    wait.as_secs()
                );
                tokio::time::sleep(wait).await;
            }

            let response = match self
                .client
                .get(url)
                .headers(header_map.clone())
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    log::warn!("Request failed (attempt {}): {e}", attempt + 1);
                    last_error = Some(FetchError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if RETRYABLE_STATUS.contains(&status.as_u16()) && attempt < self.retries {
                log::warn!("Retryable status {status} from {url}");
                continue;
            }

            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    last_error = Some(FetchError::Http(e));
                    continue;
                }
            };

            if !status.is_success() {
                log::warn!("Non-success status {status} from {url}");
            }
            log::debug!("Response {status} | {} bytes | {url}", text.len());

            return Ok(parse_body(&text, status));
        }

        Err(last_error
            .unwrap_or_else(|| FetchError::InvalidHeader("no attempts made".to_owned())))
    }
}

/// Parses a body into a payload: JSON first, then JSONP, then text.
fn parse_body(text: &str, status: StatusCode) -> Payload {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        return Payload::Json(value);
    }
    if status.is_success()
        && let Some(value) = jsonp::unwrap(text)
    {
        log::debug!("Unwrapped JSONP response");
        return Payload::Json(value);
    }
    Payload::Text(text.to_owned())
}

/// Heuristic for URLs that should speak JSON.
#[must_use]
pub fn looks_api_like(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("/api/")
        || lower.contains("stores.")
        || lower.contains("store.")
        || lower.contains("locator")
}

/// Whether a body looks like an HTML document rather than data.
#[must_use]
pub fn looks_like_html(text: &str) -> bool {
    let head = text.trim_start().to_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html") || head.starts_with("<head")
}

/// Builds a reqwest header map from configured string pairs.
fn build_header_map(
    headers: &BTreeMap<String, String>,
) -> Result<reqwest::header::HeaderMap, FetchError> {
    let mut header_map = reqwest::header::HeaderMap::new();
    for (key, value) in headers {
        let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| FetchError::InvalidHeader(format!("name '{key}': {e}")))?;
        let val = reqwest::header::HeaderValue::from_str(value)
            .map_err(|e| FetchError::InvalidHeader(format!("value '{value}': {e}")))?;
        header_map.insert(name, val);
    }
    Ok(header_map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_like_urls() {
        assert!(looks_api_like("https://stores.bellross.com/search"));
        assert!(looks_api_like("https://example.com/api/v1/locations"));
        assert!(looks_api_like("https://example.com/storelocator"));
        assert!(!looks_api_like("https://example.com/about"));
    }

    #[test]
    fn html_detection() {
        assert!(looks_like_html("<!DOCTYPE html><html>..."));
        assert!(looks_like_html("  <html lang=\"en\">"));
        assert!(!looks_like_html("{\"stores\": []}"));
    }

    #[test]
    fn parse_body_prefers_json() {
        let payload = parse_body("{\"a\": 1}", StatusCode::OK);
        assert!(payload.is_json());
    }

    #[test]
    fn parse_body_unwraps_jsonp() {
        let payload = parse_body("SMcallback2([{\"id\": 1}])", StatusCode::OK);
        let json = payload.as_json().unwrap();
        assert_eq!(json[0]["id"], 1);
    }

    #[test]
    fn parse_body_falls_back_to_text() {
        let payload = parse_body("<html><body>oops</body></html>", StatusCode::OK);
        assert!(payload.as_text().is_some());
    }

    #[test]
    fn invalid_headers_are_reported() {
        let mut headers = BTreeMap::new();
        headers.insert("Bad\nName".to_owned(), "x".to_owned());
        assert!(build_header_map(&headers).is_err());
    }
}
