#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Harvest orchestration.
//!
//! One harvest runs one brand: probe the endpoint, classify its
//! interaction pattern, optimize radius endpoints, drive the matching
//! expansion executor, infer the field mapping from the first records,
//! then stream everything through the normalizer. Per-record failures
//! accumulate; only configuration problems before the first HTTP call
//! are fatal.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use url::Url;

use store_harvest_classify::{classify, EndpointPattern, EndpointProfile, PaginationStyle};
use store_harvest_config::{BrandConfig, ConfigError, CountryReference};
use store_harvest_expand::country::CountryExecutor;
use store_harvest_expand::paginated::{PageStyle, PaginatedExecutor};
use store_harvest_expand::radius::RadiusExecutor;
use store_harvest_expand::single::SingleExecutor;
use store_harvest_expand::viewport::{region_preset, ViewportExecutor};
use store_harvest_expand::{ExpandError, ExpansionOutcome, ExpansionReport, Executor};
use store_harvest_fetch::{FetchError, Fetcher, Payload};
use store_harvest_geocode::{GeocodeError, Geocoder};
use store_harvest_mapping::{infer_field_map, FieldMap};
use store_harvest_normalize::{Normalizer, Outcome};
use store_harvest_schema::{CanonicalRecord, Excluded};

/// Errors that abort a harvest.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Configuration was unusable before any HTTP call.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The endpoint URL is missing or malformed.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    /// The initial probe failed outright.
    #[error("Probe failed: {0}")]
    Probe(#[from] FetchError),

    /// The expansion executor failed beyond recovery.
    #[error("Expansion failed: {0}")]
    Expand(#[from] ExpandError),

    /// The geocoding adapter could not be constructed.
    #[error("Geocoder error: {0}")]
    Geocode(#[from] GeocodeError),
}

/// Inputs to one harvest.
#[derive(Debug, Default)]
pub struct HarvestArgs {
    /// The locator endpoint URL (brand configuration may override).
    pub url: String,
    /// Region restriction (`"world"` when empty).
    pub region: String,
    /// Forced endpoint pattern, bypassing classification.
    pub forced_pattern: Option<EndpointPattern>,
    /// Brand configuration, when one exists.
    pub brand_config: Option<BrandConfig>,
    /// Whether the Nominatim geocoder may be used for records missing
    /// coordinates.
    pub geocode_missing: bool,
}

/// Summary of one harvest run.
#[derive(Debug, Clone)]
pub struct HarvestStats {
    /// Detected (or forced) endpoint pattern.
    pub pattern: EndpointPattern,
    /// Classifier confidence (1.0 when forced).
    pub confidence: f64,
    /// Raw records the executor yielded.
    pub fetched: usize,
    /// Records that survived normalization.
    pub normalized: usize,
    /// Records dropped for missing coordinates.
    pub excluded: usize,
    /// Fingerprint duplicates dropped by the normalizer.
    pub duplicates: u64,
    /// Executor work accounting.
    pub report: ExpansionReport,
    /// Radius-optimizer outcome, when it ran.
    pub optimizer_locked: Option<bool>,
    /// Data-quality warnings for the emitted records.
    pub warnings: Vec<String>,
}

/// One harvest's output.
#[derive(Debug)]
pub struct HarvestResult {
    /// Normalized, deduplicated records.
    pub records: Vec<CanonicalRecord>,
    /// Dropped records with reasons.
    pub excluded: Vec<Excluded>,
    /// Run statistics.
    pub stats: HarvestStats,
}

/// Runs one harvest end to end.
///
/// # Errors
///
/// Returns [`HarvestError`] for configuration problems, a failed
/// initial probe, or an unrecoverable executor failure. Everything
/// else degrades into the result's statistics.
pub async fn harvest(
    args: HarvestArgs,
    cancel: &CancellationToken,
) -> Result<HarvestResult, HarvestError> {
    let brand = args.brand_config.unwrap_or_default();

    let url = if args.url.trim().is_empty() {
        brand
            .url
            .clone()
            .ok_or_else(|| HarvestError::InvalidUrl("no URL supplied".to_owned()))?
    } else {
        args.url.clone()
    };
    Url::parse(&url).map_err(|e| HarvestError::InvalidUrl(format!("{url}: {e}")))?;

    let region = if args.region.trim().is_empty() {
        "world".to_owned()
    } else {
        args.region.clone()
    };

    let explicit_map = brand.field_map()?;
    let fetcher = Fetcher::with_headers(&brand.headers)?;

    // --- 1. Probe ---------------------------------------------------
    log::info!("Probing {url}");
    let probe = fetcher.fetch(&url).await?;
    let (sample_json, sample_is_html) = match &probe {
        Payload::Json(body) => (Some(body), false),
        Payload::Text(_) => (None, true),
    };

    // --- 2. Classify ------------------------------------------------
    let forced = args
        .forced_pattern
        .or_else(|| brand.endpoint_type.as_deref().and_then(EndpointPattern::parse));
    let profile = forced.map_or_else(
        || classify(&url, sample_json, sample_is_html),
        |pattern| EndpointProfile {
            pattern,
            confidence: 1.0,
            observed_params: BTreeMap::new(),
            pagination_style: PaginationStyle::None,
            region_specific: pattern.is_region_specific(),
            indicators: vec!["forced".to_owned()],
        },
    );
    log::info!(
        "Pattern: {} (confidence {:.2}, region-specific: {})",
        profile.pattern.name(),
        profile.confidence,
        profile.region_specific
    );
    if let Some(calls) = profile.pattern.estimated_calls_world() {
        log::debug!("Estimated calls for world coverage: ~{calls}");
    }

    // Radius routing also catches paginated endpoints that carry radius
    // and center parameters.
    let has_radius = ["r", "radius", "distance"]
        .iter()
        .any(|k| profile.observed_params.contains_key(*k));
    let has_center = ["q", "lat", "latitude"]
        .iter()
        .any(|k| profile.observed_params.contains_key(*k));
    let radius_routed = profile.pattern == EndpointPattern::Radius
        || (profile.pattern == EndpointPattern::Paginated && has_radius && has_center);

    // --- 3. Optimize + execute --------------------------------------
    let mut optimizer_locked = None;
    let data_path = brand.data_path.clone();

    let outcome: ExpansionOutcome = if radius_routed {
        let optimization =
            store_harvest_optimize::optimize_radius_endpoint(&fetcher, &url).await;
        optimizer_locked = Some(optimization.success);
        let run_url = optimization.optimized_url.clone();
        if !optimization.success {
            log::warn!("Radius optimizer locked no configuration; using original URL");
        }
        RadiusExecutor::new(fetcher.clone(), &run_url)
            .with_data_path(data_path.clone())
            .with_region(&region)
            .run(cancel)
            .await?
    } else {
        match profile.pattern {
            EndpointPattern::Paginated => {
                let style = match profile.pagination_style {
                    PaginationStyle::Token => Some(PageStyle::Token),
                    PaginationStyle::Offset => Some(PageStyle::Offset),
                    PaginationStyle::Page => Some(PageStyle::Page),
                    PaginationStyle::None => None,
                };
                let mut executor = PaginatedExecutor::new(fetcher.clone(), &url)
                    .with_data_path(data_path.clone());
                if let Some(style) = style {
                    executor = executor.with_style(style);
                }
                executor.run(cancel).await?
            }
            EndpointPattern::Viewport => {
                let mut executor = ViewportExecutor::new(fetcher.clone(), &url)
                    .with_data_path(data_path.clone());
                if let Some(bounds) = region_preset(&region) {
                    executor = executor.with_bounds(bounds);
                }
                executor.run(cancel).await?
            }
            EndpointPattern::Country => {
                let countries = country_axis(&brand, &region);
                CountryExecutor::new(fetcher.clone(), &url, countries)
                    .with_data_path(data_path.clone())
                    .with_country_id_map(brand.country_id_map.clone())
                    .run(cancel)
                    .await?
            }
            // Already routed above; kept for exhaustiveness.
            EndpointPattern::Radius => {
                RadiusExecutor::new(fetcher.clone(), &url)
                    .with_data_path(data_path.clone())
                    .with_region(&region)
                    .run(cancel)
                    .await?
            }
            EndpointPattern::Single | EndpointPattern::HtmlEmbedded => {
                SingleExecutor::new(fetcher.clone(), &url)
                    .with_data_path(data_path.clone())
                    .run(cancel)
                    .await?
            }
        }
    };

    let fetched = outcome.records.len();
    log::info!("Collected {fetched} raw records");

    // --- 4. Field map: explicit configuration wins, else infer from
    // the first records of the stream.
    let field_map = explicit_map.map_or_else(
        || {
            if outcome.records.is_empty() {
                FieldMap::new()
            } else {
                infer_field_map(&outcome.records)
            }
        },
        |map| map,
    );
    log::info!(
        "Field mapping: {} ({} fields)",
        if field_map.is_empty() { "canonical pass-through" } else { "active" },
        field_map.len()
    );

    let mut field_map = field_map;
    if field_map.base_url().is_none()
        && let Ok(parsed) = Url::parse(&url)
        && let Some(host) = parsed.host_str()
    {
        field_map.set_base_url(format!("{}://{host}/", parsed.scheme()));
    }

    // --- 5. Normalize -----------------------------------------------
    let geocoder = if args.geocode_missing {
        Geocoder::new()?
    } else {
        Geocoder::disabled()
    };
    let reference = CountryReference::embedded();
    let country_names: Vec<String> = reference
        .names()
        .into_iter()
        .map(str::to_owned)
        .collect();

    let mut normalizer = Normalizer::new(field_map, Arc::new(geocoder), country_names);
    let mut records = Vec::new();
    let mut excluded = Vec::new();

    for raw in &outcome.records {
        match normalizer.normalize(raw).await {
            Outcome::Record(record) => records.push(*record),
            Outcome::Excluded(report) => excluded.push(report),
            Outcome::Duplicate => {}
        }
    }

    let warnings = data_quality_warnings(&records);
    for warning in &warnings {
        log::warn!("Data quality: {warning}");
    }

    let stats = HarvestStats {
        pattern: profile.pattern,
        confidence: profile.confidence,
        fetched,
        normalized: records.len(),
        excluded: excluded.len(),
        duplicates: normalizer.duplicate_count(),
        report: outcome.report,
        optimizer_locked,
        warnings,
    };

    log::info!(
        "Harvest complete: {} normalized, {} excluded, {} duplicates",
        stats.normalized,
        stats.excluded,
        stats.duplicates
    );

    Ok(HarvestResult {
        records,
        excluded,
        stats,
    })
}

/// Resolves the country axis: explicit brand countries win, then the
/// reference list filtered by region.
fn country_axis(brand: &BrandConfig, region: &str) -> BTreeMap<String, String> {
    if !brand.countries.is_empty() && !brand.use_watch_store_countries {
        return brand.countries.clone();
    }
    CountryReference::embedded().for_region(region)
}

/// Scans emitted records for data-quality gaps worth surfacing.
fn data_quality_warnings(records: &[CanonicalRecord]) -> Vec<String> {
    if records.is_empty() {
        return Vec::new();
    }
    let mut warnings = Vec::new();

    let no_name = records.iter().filter(|r| !r.has("Name")).count();
    if no_name > 0 {
        warnings.push(format!("{no_name} record(s) have no name"));
    }
    let no_coords = records
        .iter()
        .filter(|r| !r.has("Latitude") || !r.has("Longitude"))
        .count();
    if no_coords > 0 {
        warnings.push(format!(
            "{no_coords} record(s) have missing or invalid coordinates"
        ));
    }
    let no_address = records.iter().filter(|r| !r.has("Address Line 1")).count();
    if no_address > 0 {
        warnings.push(format!("{no_address} record(s) have no address"));
    }
    let no_phone = records.iter().filter(|r| !r.has("Phone")).count();
    if no_phone > 0 {
        warnings.push(format!("{no_phone} record(s) have no phone number"));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_axis_prefers_brand_countries() {
        let mut brand = BrandConfig::default();
        brand
            .countries
            .insert("US".to_owned(), "United States".to_owned());
        brand.countries.insert("IT".to_owned(), "Italy".to_owned());
        let axis = country_axis(&brand, "world");
        assert_eq!(axis.len(), 2);
        assert!(axis.contains_key("IT"));
    }

    #[test]
    fn country_axis_falls_back_to_reference() {
        let axis = country_axis(&BrandConfig::default(), "middle_east");
        assert!(axis.contains_key("AE"));
        assert!(!axis.contains_key("US"));
    }

    #[test]
    fn data_quality_warnings_count_gaps() {
        let mut complete = CanonicalRecord::new();
        complete.set("Name", "A");
        complete.set("Address Line 1", "1 Main St");
        complete.set("Phone", "+1 212 555 0100");
        complete.set("Latitude", "40.7128000");
        complete.set("Longitude", "-74.0060000");
        let mut missing_phone = CanonicalRecord::new();
        missing_phone.set("Name", "B");
        missing_phone.set("Address Line 1", "2 Main St");
        missing_phone.set("Latitude", "40.7300000");
        missing_phone.set("Longitude", "-74.0100000");

        let warnings = data_quality_warnings(&[complete.clone(), missing_phone]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("no phone number"));

        let mut missing_coords = complete;
        missing_coords.set("Latitude", "");
        let warnings = data_quality_warnings(&[missing_coords]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("missing or invalid coordinates"));
    }

    #[tokio::test]
    async fn missing_url_is_a_configuration_error() {
        let cancel = CancellationToken::new();
        let result = harvest(HarvestArgs::default(), &cancel).await;
        assert!(matches!(result, Err(HarvestError::InvalidUrl(_))));
    }
}
