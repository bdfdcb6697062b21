#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Radius endpoint optimization.
//!
//! A discovered radius URL usually carries whatever tiny radius the
//! brand's own frontend last used. Before the radius executor fans out,
//! this optimizer searches the parameter space in two phases:
//!
//! 1. **Lock** — with a fixed probe radius, try center and pagination
//!    strategies in order until one combination returns any stores.
//!    That combination is locked; only the radius varies afterwards.
//! 2. **Sweep** — under the locked configuration, try radius values in
//!    ascending order and keep the first maximum store count.
//!
//! Failing to lock is not fatal: the caller proceeds with the original
//! URL and best-effort coverage.

use std::collections::BTreeMap;

use store_harvest_expand::containers::find_record_array;
use store_harvest_fetch::{Fetcher, Payload};
use url::Url;

/// Probe radius used while locking the configuration.
pub const PROBE_RADIUS: u64 = 2000;

/// Radius values swept in phase 2, ascending.
pub const RADIUS_SWEEP: [u64; 6] = [500, 1000, 2000, 5000, 10000, 25000];

/// Default center tried when the URL gives none (central Paris).
const FALLBACK_Q_CENTER: &str = "48.8566,2.3522";

/// How one probe call was centered.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Center {
    /// Separate `lat` / `long` parameters.
    LatLong(String, String),
    /// A combined `q=lat,lng` parameter.
    Q(String),
}

impl Center {
    fn describe(&self) -> String {
        match self {
            Self::LatLong(lat, long) => format!("lat={lat}&long={long}"),
            Self::Q(q) => format!("q={q}"),
        }
    }
}

/// Pagination parameters attached to a probe call, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Pagination {
    limit_key: String,
    offset_key: String,
    limit_value: String,
    offset_value: String,
}

/// One probe attempt and what it returned.
#[derive(Debug, Clone)]
pub struct TestedVariant {
    /// The URL probed.
    pub url: String,
    /// The radius value used.
    pub radius: u64,
    /// Stores the probe returned.
    pub store_count: usize,
    /// Whether the call succeeded at all.
    pub success: bool,
}

/// Optimizer output.
#[derive(Debug, Clone)]
pub struct RadiusOptimization {
    /// Best URL found (the original when nothing worked).
    pub optimized_url: String,
    /// The URL the optimizer started from.
    pub original_url: String,
    /// Store count from the best variant.
    pub best_store_count: usize,
    /// Radius of the best variant.
    pub radius_used: Option<u64>,
    /// Human-readable description of the locked center/pagination.
    pub center_used: Option<String>,
    /// Every probe attempted.
    pub tested_variants: Vec<TestedVariant>,
    /// Whether a working configuration was locked.
    pub success: bool,
}

/// Optimizes a radius endpoint. Returns an unverified result (original
/// URL, `success = false`) when the URL carries no radius parameter or
/// no configuration returned data.
pub async fn optimize_radius_endpoint(fetcher: &Fetcher, url: &str) -> RadiusOptimization {
    let mut result = RadiusOptimization {
        optimized_url: url.to_owned(),
        original_url: url.to_owned(),
        best_store_count: 0,
        radius_used: None,
        center_used: None,
        tested_variants: Vec::new(),
        success: false,
    };

    let Ok(parsed) = Url::parse(url) else {
        log::warn!("Radius optimizer got an unparseable URL: {url}");
        return result;
    };
    let params: BTreeMap<String, String> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut base = parsed;
    base.set_query(None);

    let Some(radius_key) = ["r", "radius", "distance"]
        .iter()
        .find(|k| params.contains_key(**k))
        .map(|k| (*k).to_owned())
    else {
        log::debug!("No radius parameter on {url}, skipping optimization");
        return result;
    };

    let centers = center_strategies(&params);
    let paginations = pagination_strategies(&params);

    // --- Phase 1: lock the first (center, pagination) that returns data.
    let mut locked: Option<(Center, Option<Pagination>, usize)> = None;
    'outer: for center in &centers {
        for pagination in &paginations {
            let test_url = build_test_url(
                &base,
                &params,
                &radius_key,
                PROBE_RADIUS,
                center,
                pagination.as_ref(),
            );
            let (count, success) = probe(fetcher, &test_url).await;
            result.tested_variants.push(TestedVariant {
                url: test_url,
                radius: PROBE_RADIUS,
                store_count: count,
                success,
            });
            if count > 0 {
                log::info!(
                    "Locked radius config: {}, pagination {:?} ({count} stores)",
                    center.describe(),
                    pagination.as_ref().map(|p| p.limit_key.clone())
                );
                locked = Some((center.clone(), pagination.clone(), count));
                break 'outer;
            }
        }
    }

    let Some((center, pagination, locked_count)) = locked else {
        log::warn!("No radius configuration returned data for {url}");
        if let Some(best) = result
            .tested_variants
            .iter()
            .max_by_key(|v| (v.success, v.radius))
        {
            result.optimized_url = best.url.clone();
            result.radius_used = Some(best.radius);
            result.best_store_count = best.store_count;
        }
        return result;
    };

    // --- Phase 2: same configuration, radius ascending; first maximum
    // wins.
    let mut best: Option<(u64, usize, String)> = None;
    for radius in RADIUS_SWEEP {
        let test_url =
            build_test_url(&base, &params, &radius_key, radius, &center, pagination.as_ref());
        let (count, success) = probe(fetcher, &test_url).await;
        result.tested_variants.push(TestedVariant {
            url: test_url.clone(),
            radius,
            store_count: count,
            success,
        });
        if count > 0 && best.as_ref().is_none_or(|(_, c, _)| count > *c) {
            log::debug!("radius={radius} -> {count} stores");
            best = Some((radius, count, test_url));
        }
    }

    result.center_used = Some(center.describe());
    result.success = true;
    if let Some((radius, count, best_url)) = best {
        result.optimized_url = best_url;
        result.best_store_count = count;
        result.radius_used = Some(radius);
    } else {
        // Sweep produced nothing better; keep the locked probe config.
        result.optimized_url = build_test_url(
            &base,
            &params,
            &radius_key,
            PROBE_RADIUS,
            &center,
            pagination.as_ref(),
        );
        result.best_store_count = locked_count;
        result.radius_used = Some(PROBE_RADIUS);
    }

    log::info!(
        "Radius optimization: radius={:?}, {} stores",
        result.radius_used,
        result.best_store_count
    );
    result
}

async fn probe(fetcher: &Fetcher, url: &str) -> (usize, bool) {
    match fetcher.fetch(url).await {
        Ok(Payload::Json(body)) => {
            let count = find_record_array(&body, None).map_or(0, |records| records.len());
            (count, true)
        }
        Ok(Payload::Text(_)) => (0, true),
        Err(e) => {
            log::debug!("Probe failed for {url}: {e}");
            (0, false)
        }
    }
}

/// Center strategies in lock order: whatever the URL already uses, then
/// the generic fallbacks.
fn center_strategies(params: &BTreeMap<String, String>) -> Vec<Center> {
    let mut centers = Vec::new();

    let has_lat_long = params.contains_key("lat") || params.contains_key("latitude");
    let q_value = params
        .get("q")
        .or_else(|| params.get("center"))
        .cloned()
        .filter(|v| !v.is_empty());

    if has_lat_long {
        let lat = params
            .get("lat")
            .or_else(|| params.get("latitude"))
            .cloned()
            .unwrap_or_else(|| "0".to_owned());
        let long = params
            .get("long")
            .or_else(|| params.get("longitude"))
            .cloned()
            .unwrap_or_else(|| "0".to_owned());
        centers.push(Center::LatLong(lat, long));
        centers.push(Center::LatLong("0".to_owned(), "0".to_owned()));
    } else if q_value.is_some() {
        if let Some(q) = q_value {
            centers.push(Center::Q(q));
        }
        centers.push(Center::Q(FALLBACK_Q_CENTER.to_owned()));
        centers.push(Center::LatLong("0".to_owned(), "0".to_owned()));
    } else {
        centers.push(Center::LatLong("0".to_owned(), "0".to_owned()));
        centers.push(Center::Q(FALLBACK_Q_CENTER.to_owned()));
    }

    centers
}

/// Pagination strategies in lock order: the URL's own parameters first,
/// then the generic ladder, then no pagination at all.
fn pagination_strategies(params: &BTreeMap<String, String>) -> Vec<Option<Pagination>> {
    let mut strategies = Vec::new();

    let keyed = |limit_key: &str| {
        Some(Pagination {
            limit_key: limit_key.to_owned(),
            offset_key: "offset".to_owned(),
            limit_value: "50".to_owned(),
            offset_value: "0".to_owned(),
        })
    };

    if params.contains_key("offset") || params.contains_key("per") {
        strategies.push(keyed("per"));
    } else if params.contains_key("per_page") {
        strategies.push(keyed("per_page"));
    } else if params.contains_key("limit") {
        strategies.push(keyed("limit"));
    }

    for limit_key in ["per", "per_page", "limit"] {
        strategies.push(keyed(limit_key));
    }
    strategies.push(None);

    let mut seen = Vec::new();
    strategies.retain(|s| {
        if seen.contains(s) {
            false
        } else {
            seen.push(s.clone());
            true
        }
    });
    strategies
}

fn build_test_url(
    base: &Url,
    params: &BTreeMap<String, String>,
    radius_key: &str,
    radius: u64,
    center: &Center,
    pagination: Option<&Pagination>,
) -> String {
    let mut test = params.clone();
    test.insert(radius_key.to_owned(), radius.to_string());

    for key in ["qp", "query", "location", "address"] {
        test.remove(key);
    }

    match center {
        Center::LatLong(lat, long) => {
            test.insert("lat".to_owned(), lat.clone());
            test.insert("long".to_owned(), long.clone());
            for key in ["q", "center", "lng", "latitude", "longitude"] {
                test.remove(key);
            }
        }
        Center::Q(q) => {
            test.insert("q".to_owned(), q.clone());
            for key in ["lat", "lng", "latitude", "longitude", "center"] {
                test.remove(key);
            }
        }
    }

    if let Some(pagination) = pagination {
        for key in ["offset", "per", "per_page", "limit", "page", "pageToken"] {
            test.remove(key);
        }
        test.insert(pagination.limit_key.clone(), pagination.limit_value.clone());
        test.insert(pagination.offset_key.clone(), pagination.offset_value.clone());
    }

    let mut url = base.clone();
    url.query_pairs_mut().clear().extend_pairs(test.iter());
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn center_strategies_prefer_existing_lat_long() {
        let centers = center_strategies(&params(&[("lat", "40.7"), ("long", "-74.0")]));
        assert_eq!(
            centers[0],
            Center::LatLong("40.7".to_owned(), "-74.0".to_owned())
        );
        assert_eq!(centers[1], Center::LatLong("0".to_owned(), "0".to_owned()));
    }

    #[test]
    fn center_strategies_fall_back_to_paris_q() {
        let centers = center_strategies(&params(&[]));
        assert_eq!(centers[0], Center::LatLong("0".to_owned(), "0".to_owned()));
        assert_eq!(centers[1], Center::Q(FALLBACK_Q_CENTER.to_owned()));
    }

    #[test]
    fn pagination_strategies_dedupe_and_end_with_none() {
        let strategies = pagination_strategies(&params(&[("per", "25"), ("offset", "0")]));
        assert_eq!(strategies.len(), 4);
        assert_eq!(
            strategies[0].as_ref().map(|p| p.limit_key.as_str()),
            Some("per")
        );
        assert!(strategies.last().unwrap().is_none());
    }

    #[test]
    fn test_url_replaces_center_and_pagination() {
        let base = Url::parse("https://api.example.com/search").unwrap();
        let source = params(&[("r", "124.3"), ("q", "old"), ("qp", "Paris"), ("offset", "100")]);
        let url = build_test_url(
            &base,
            &source,
            "r",
            2000,
            &Center::Q(FALLBACK_Q_CENTER.to_owned()),
            Some(&Pagination {
                limit_key: "per".to_owned(),
                offset_key: "offset".to_owned(),
                limit_value: "50".to_owned(),
                offset_value: "0".to_owned(),
            }),
        );
        assert!(url.contains("r=2000"));
        assert!(url.contains("per=50"));
        assert!(url.contains("offset=0"));
        assert!(!url.contains("qp="));
        assert!(url.contains("q=48.8566%2C2.3522"));
    }

    #[test]
    fn deterministic_strategy_order() {
        let p = params(&[("r", "100"), ("lat", "1"), ("long", "2"), ("per", "50")]);
        let first = (center_strategies(&p), pagination_strategies(&p));
        let second = (center_strategies(&p), pagination_strategies(&p));
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }
}
