//! Radius executor: expand a radius-search API from many city centers.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use store_harvest_fetch::{Fetcher, Payload};

use crate::containers::{declared_total, find_record_array};
use crate::pool::{TaskYield, WorkerPool, DEFAULT_WORKERS};
use crate::{build_url, split_url, ExpandError, ExpansionOutcome, Executor, IdentitySet};

/// Page cap per city.
pub const MAX_CITY_PAGES: u64 = 100;

/// Default search radius when the URL does not carry one.
pub const DEFAULT_RADIUS: &str = "2000";

/// Default page size.
pub const DEFAULT_PER_PAGE: u64 = 50;

const CALL_DELAY: Duration = Duration::from_millis(300);

/// Major-city center points covering every continent. Radius circles
/// around these overlap on purpose; in-stream identity dedup absorbs it.
pub const CITY_CENTERS: [(&str, f64, f64); 60] = [
    // Europe
    ("Paris", 48.8566, 2.3522),
    ("London", 51.5074, -0.1278),
    ("Berlin", 52.52, 13.405),
    ("Madrid", 40.4168, -3.7038),
    ("Rome", 41.9028, 12.4964),
    ("Amsterdam", 52.3676, 4.9041),
    ("Vienna", 48.2082, 16.3738),
    ("Zurich", 47.3769, 8.5417),
    ("Moscow", 55.7558, 37.6173),
    ("Stockholm", 59.3293, 18.0686),
    ("Copenhagen", 55.6761, 12.5683),
    ("Warsaw", 52.2297, 21.0122),
    ("Prague", 50.0755, 14.4378),
    ("Athens", 37.9838, 23.7275),
    ("Lisbon", 38.7223, -9.1393),
    ("Dublin", 53.3498, -6.2603),
    ("Brussels", 50.8503, 4.3517),
    ("Oslo", 59.9139, 10.7522),
    ("Helsinki", 60.1699, 24.9384),
    // Americas
    ("New York", 40.7128, -74.006),
    ("Los Angeles", 34.0522, -118.2437),
    ("Chicago", 41.8781, -87.6298),
    ("San Francisco", 37.7749, -122.4194),
    ("Houston", 29.7604, -95.3698),
    ("Toronto", 43.6532, -79.3832),
    ("Vancouver", 49.2827, -123.1207),
    ("Mexico City", 19.4326, -99.1332),
    ("Sao Paulo", -23.5505, -46.6333),
    ("Rio de Janeiro", -22.9068, -43.1729),
    ("Buenos Aires", -34.6037, -58.3816),
    ("Miami", 25.7617, -80.1918),
    ("Bogota", 4.711, -74.0721),
    ("Lima", -12.0464, -77.0428),
    ("Santiago", -33.4489, -70.6693),
    // Asia-Pacific
    ("Tokyo", 35.6762, 139.6503),
    ("Shanghai", 31.2304, 121.4737),
    ("Beijing", 39.9042, 116.4074),
    ("Hong Kong", 22.3193, 114.1694),
    ("Singapore", 1.3521, 103.8198),
    ("Bangkok", 13.7563, 100.5018),
    ("Kuala Lumpur", 3.139, 101.6869),
    ("Jakarta", -6.2088, 106.8456),
    ("Manila", 14.5995, 120.9842),
    ("Mumbai", 19.076, 72.8777),
    ("Delhi", 28.6139, 77.209),
    ("Bangalore", 12.9716, 77.5946),
    ("Dubai", 25.2048, 55.2708),
    ("Sydney", -33.8688, 151.2093),
    ("Melbourne", -37.8136, 144.9631),
    ("Seoul", 37.5665, 126.978),
    ("Taipei", 25.033, 121.5654),
    // Middle East & Africa
    ("Riyadh", 24.7136, 46.6753),
    ("Jeddah", 21.4858, 39.1925),
    ("Cairo", 30.0444, 31.2357),
    ("Johannesburg", -26.2041, 28.0473),
    ("Cape Town", -33.9249, 18.4241),
    ("Lagos", 6.5244, 3.3792),
    ("Nairobi", -1.2921, 36.8219),
    ("Tel Aviv", 32.0853, 34.7818),
    ("Istanbul", 41.0082, 28.9784),
];

/// City subset for a named region; the full ring for `"world"`.
#[must_use]
pub fn cities_for_region(region: &str) -> Vec<(&'static str, f64, f64)> {
    let subset: &[&str] = match region.trim().to_lowercase().as_str() {
        "north_america" => &["New York", "Los Angeles", "Chicago", "Toronto", "Miami", "Mexico City"],
        "europe" => &[
            "Paris",
            "London",
            "Berlin",
            "Madrid",
            "Rome",
            "Amsterdam",
            "Vienna",
            "Zurich",
            "Moscow",
        ],
        "asia" => &[
            "Tokyo",
            "Shanghai",
            "Hong Kong",
            "Singapore",
            "Bangkok",
            "Mumbai",
            "Dubai",
            "Seoul",
            "Taipei",
        ],
        _ => return CITY_CENTERS.to_vec(),
    };
    CITY_CENTERS
        .iter()
        .filter(|(name, _, _)| subset.contains(name))
        .copied()
        .collect()
}

/// Parameter names the endpoint uses for radius, page size, and center.
#[derive(Debug, Clone)]
struct RadiusParams {
    radius_key: String,
    radius_value: String,
    per_key: String,
    per_value: u64,
    lat_long_center: bool,
}

fn detect_radius_params(params: &BTreeMap<String, String>) -> RadiusParams {
    let radius_key = ["r", "radius", "distance"]
        .iter()
        .find(|k| params.contains_key(**k))
        .map_or_else(|| "r".to_owned(), |k| (*k).to_owned());
    let radius_value = params
        .get(&radius_key)
        .cloned()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_RADIUS.to_owned());

    let per_key = ["per", "per_page", "limit"]
        .iter()
        .find(|k| params.contains_key(**k))
        .map_or_else(|| "per".to_owned(), |k| (*k).to_owned());
    let per_value = params
        .get(&per_key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PER_PAGE);

    let lat_long_center = params.contains_key("lat") || params.contains_key("latitude");

    RadiusParams {
        radius_key,
        radius_value,
        per_key,
        per_value,
        lat_long_center,
    }
}

/// Executor for radius-search APIs: queries around each city center,
/// paginating with offsets, and unions the results.
#[derive(Debug)]
pub struct RadiusExecutor {
    fetcher: Fetcher,
    url: String,
    data_path: Option<String>,
    region: String,
    workers: usize,
}

impl RadiusExecutor {
    /// Creates a radius executor covering the world.
    #[must_use]
    pub fn new(fetcher: Fetcher, url: &str) -> Self {
        Self {
            fetcher,
            url: url.to_owned(),
            data_path: None,
            region: "world".to_owned(),
            workers: DEFAULT_WORKERS,
        }
    }

    /// Sets the dot-separated path to the record array.
    #[must_use]
    pub fn with_data_path(mut self, data_path: Option<String>) -> Self {
        self.data_path = data_path;
        self
    }

    /// Restricts the city ring to a region.
    #[must_use]
    pub fn with_region(mut self, region: &str) -> Self {
        self.region = region.to_owned();
        self
    }
}

impl Executor for RadiusExecutor {
    async fn run(&self, cancel: &CancellationToken) -> Result<ExpansionOutcome, ExpandError> {
        let (base, params) = split_url(&self.url)?;
        let radius_params = detect_radius_params(&params);

        // Center and pagination params are set per call.
        let mut base_params = params;
        for key in ["q", "qp", "offset", "lat", "long", "latitude", "longitude"] {
            base_params.remove(key);
        }
        base_params.insert(
            radius_params.radius_key.clone(),
            radius_params.radius_value.clone(),
        );
        base_params.insert(
            radius_params.per_key.clone(),
            radius_params.per_value.to_string(),
        );

        let cities = cities_for_region(&self.region);
        log::info!(
            "Radius expansion: {} centers, radius {}",
            cities.len(),
            radius_params.radius_value
        );

        let fetcher = self.fetcher.clone();
        let data_path = self.data_path.clone();
        let cancel_inner = cancel.clone();

        let pool = WorkerPool::new(self.workers, CALL_DELAY);
        let yields = pool
            .run(
                cities,
                cancel,
                move |(city, lat, lng): (&'static str, f64, f64)| {
                    let fetcher = fetcher.clone();
                    let data_path = data_path.clone();
                    let base = base.clone();
                    let base_params = base_params.clone();
                    let radius_params = radius_params.clone();
                    let cancel = cancel_inner.clone();
                    async move {
                        harvest_city(
                            &fetcher,
                            &base,
                            &base_params,
                            &radius_params,
                            data_path.as_deref(),
                            &cancel,
                            city,
                            lat,
                            lng,
                        )
                        .await
                    }
                },
            )
            .await;

        let mut outcome = ExpansionOutcome::default();
        let mut identities = IdentitySet::new();
        for result in yields {
            outcome.report.cells_visited += 1;
            outcome.report.pages_walked += result.pages;
            if result.empty {
                outcome.report.empty_cells += 1;
            }
            if result.failed {
                outcome.report.failed_calls += 1;
            }
            let fresh = identities.filter_new(result.records, &mut outcome.report);
            outcome.records.extend(fresh);
        }

        log::info!(
            "Radius expansion complete: {} unique records from {} centers",
            outcome.records.len(),
            outcome.report.cells_visited
        );
        Ok(outcome)
    }

    fn strategy(&self) -> &'static str {
        "radius"
    }
}

/// Pages through one city's results.
#[allow(clippy::too_many_arguments)]
async fn harvest_city(
    fetcher: &Fetcher,
    base: &url::Url,
    base_params: &BTreeMap<String, String>,
    radius_params: &RadiusParams,
    data_path: Option<&str>,
    cancel: &CancellationToken,
    city: &str,
    lat: f64,
    lng: f64,
) -> TaskYield {
    let mut result = TaskYield::default();
    let mut offset: u64 = 0;
    let mut page: u64 = 0;

    loop {
        if cancel.is_cancelled() || page >= MAX_CITY_PAGES {
            if page >= MAX_CITY_PAGES {
                log::warn!("Hit the {MAX_CITY_PAGES}-page cap for {city}");
            }
            break;
        }

        let mut call_params = base_params.clone();
        if radius_params.lat_long_center {
            call_params.insert("lat".to_owned(), lat.to_string());
            call_params.insert("long".to_owned(), lng.to_string());
        } else {
            call_params.insert("q".to_owned(), format!("{lat},{lng}"));
        }
        call_params.insert("offset".to_owned(), offset.to_string());
        let url = build_url(base, &call_params);

        let body = match fetcher.fetch(&url).await {
            Ok(Payload::Json(body)) => body,
            Ok(Payload::Text(_)) => {
                log::warn!("Non-JSON response for {city}, skipping center");
                result.failed = true;
                break;
            }
            Err(e) => {
                log::warn!("Fetch failed for {city}: {e}");
                result.failed = true;
                break;
            }
        };

        let Some(records) = find_record_array(&body, data_path) else {
            break;
        };
        if records.is_empty() {
            break;
        }

        let batch_len = records.len() as u64;
        result.records.extend(records);
        result.pages += 1;
        page += 1;

        if batch_len < radius_params.per_value {
            break;
        }
        if let Some(total) = declared_total(&body)
            && result.records.len() as u64 >= total
        {
            break;
        }

        offset += radius_params.per_value;
        tokio::time::sleep(CALL_DELAY).await;
    }

    result.empty = result.records.is_empty();
    log::debug!("{city}: {} records over {} pages", result.records.len(), result.pages);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_ring_covers_every_continent() {
        let cities = cities_for_region("world");
        assert_eq!(cities.len(), 60);
    }

    #[test]
    fn region_subsets() {
        let europe = cities_for_region("europe");
        assert_eq!(europe.len(), 9);
        assert!(europe.iter().any(|(name, _, _)| *name == "Paris"));
        assert!(europe.iter().all(|(name, _, _)| *name != "Tokyo"));
    }

    #[test]
    fn radius_param_detection_prefers_existing_keys() {
        let mut params = BTreeMap::new();
        params.insert("radius".to_owned(), "100".to_owned());
        params.insert("limit".to_owned(), "25".to_owned());
        let detected = detect_radius_params(&params);
        assert_eq!(detected.radius_key, "radius");
        assert_eq!(detected.radius_value, "100");
        assert_eq!(detected.per_key, "limit");
        assert_eq!(detected.per_value, 25);
    }

    #[test]
    fn radius_param_defaults() {
        let detected = detect_radius_params(&BTreeMap::new());
        assert_eq!(detected.radius_key, "r");
        assert_eq!(detected.radius_value, DEFAULT_RADIUS);
        assert_eq!(detected.per_key, "per");
        assert_eq!(detected.per_value, DEFAULT_PER_PAGE);
        assert!(!detected.lat_long_center);
    }
}
