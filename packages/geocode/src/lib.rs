#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Forward geocoding for stores that arrive without coordinates.
//!
//! Wraps the Nominatim / OpenStreetMap search endpoint behind a
//! rate-limited, memoising adapter. Nominatim's public instance allows
//! **1 request per second** — the adapter serialises calls and sleeps
//! between them globally. Failed lookups are cached as misses so a bad
//! address is only attempted once per run.
//!
//! The adapter is optional: [`Geocoder::disabled`] resolves nothing,
//! which downstream code treats as "geocoding unavailable".

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Public Nominatim search endpoint.
pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org/search";

/// Minimum gap between requests (public-instance policy).
pub const RATE_LIMIT: Duration = Duration::from_secs(1);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from geocoding operations.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

/// A resolved coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Latitude (WGS84).
    pub lat: f64,
    /// Longitude (WGS84).
    pub lng: f64,
}

#[derive(Debug)]
struct GeocoderState {
    cache: HashMap<String, Option<GeoPoint>>,
    last_call: Option<Instant>,
}

/// Rate-limited Nominatim adapter with a per-run memo.
#[derive(Debug)]
pub struct Geocoder {
    client: Option<reqwest::Client>,
    base_url: String,
    state: Mutex<GeocoderState>,
}

impl Geocoder {
    /// Creates an adapter against the public Nominatim instance.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, GeocodeError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates an adapter against a custom Nominatim-compatible base URL.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the HTTP client cannot be built.
    pub fn with_base_url(base_url: &str) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("store-harvest/0.1 (store locator pipeline)")
            .build()?;
        Ok(Self {
            client: Some(client),
            base_url: base_url.to_owned(),
            state: Mutex::new(GeocoderState {
                cache: HashMap::new(),
                last_call: None,
            }),
        })
    }

    /// Creates an adapter that resolves nothing (geocoding switched off).
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            client: None,
            base_url: String::new(),
            state: Mutex::new(GeocoderState {
                cache: HashMap::new(),
                last_call: None,
            }),
        }
    }

    /// Whether this adapter can actually reach a geocoding service.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Geocodes a free-form address built from the given parts.
    ///
    /// Returns `None` when the adapter is disabled, the parts are all
    /// empty, the service has no match, or a previous attempt for the
    /// same address failed.
    pub async fn geocode(
        &self,
        line1: &str,
        city: &str,
        state: &str,
        country: &str,
    ) -> Option<GeoPoint> {
        let client = self.client.as_ref()?;

        let parts: Vec<&str> = [line1, city, state, country]
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            return None;
        }
        let query = parts.join(", ");
        let cache_key = query.to_lowercase();

        let mut state = self.state.lock().await;

        if let Some(cached) = state.cache.get(&cache_key) {
            return *cached;
        }

        // Global rate limit: at most one request per second, enforced
        // while holding the lock so concurrent callers queue up.
        if let Some(last) = state.last_call {
            let since = last.elapsed();
            if since < RATE_LIMIT {
                tokio::time::sleep(RATE_LIMIT - since).await;
            }
        }
        state.last_call = Some(Instant::now());

        let result = match lookup(client, &self.base_url, &query).await {
            Ok(point) => point,
            Err(e) => {
                log::warn!("Geocoding failed for '{query}': {e}");
                None
            }
        };

        state.cache.insert(cache_key, result);
        result
    }
}

/// One Nominatim search call.
async fn lookup(
    client: &reqwest::Client,
    base_url: &str,
    query: &str,
) -> Result<Option<GeoPoint>, GeocodeError> {
    let resp = client
        .get(base_url)
        .query(&[("q", query), ("format", "jsonv2"), ("limit", "1")])
        .send()
        .await?;

    let body: serde_json::Value = resp.json().await?;
    parse_response(&body)
}

/// Parses a Nominatim JSON response into a coordinate pair.
fn parse_response(body: &serde_json::Value) -> Result<Option<GeoPoint>, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let lat = first["lat"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lat in Nominatim response".to_string(),
        })?;

    let lng = first["lon"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lon in Nominatim response".to_string(),
        })?;

    Ok(Some(GeoPoint { lat, lng }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nominatim_result() {
        let body = serde_json::json!([{
            "lat": "48.8566",
            "lon": "2.3522",
            "display_name": "Paris, Île-de-France, France"
        }]);
        let point = parse_response(&body).unwrap().unwrap();
        assert!((point.lat - 48.8566).abs() < 1e-4);
        assert!((point.lng - 2.3522).abs() < 1e-4);
    }

    #[test]
    fn parses_empty_result() {
        let body = serde_json::json!([]);
        assert!(parse_response(&body).unwrap().is_none());
    }

    #[test]
    fn rejects_non_array_response() {
        let body = serde_json::json!({"error": "rate limited"});
        assert!(parse_response(&body).is_err());
    }

    #[tokio::test]
    async fn disabled_adapter_resolves_nothing() {
        let geocoder = Geocoder::disabled();
        assert!(!geocoder.is_enabled());
        let result = geocoder.geocode("1 Main St", "Springfield", "", "USA").await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn empty_address_short_circuits() {
        let geocoder = Geocoder::disabled();
        assert!(geocoder.geocode("", " ", "", "").await.is_none());
    }
}
