//! Country executor: iterate a country axis, optionally paginating
//! within each country.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use store_harvest_fetch::{Fetcher, Payload};

use crate::containers::{declared_total, find_record_array};
use crate::pool::{TaskYield, WorkerPool, DEFAULT_WORKERS};
use crate::{build_url, split_url, ExpandError, ExpansionOutcome, Executor, IdentitySet};

const COUNTRY_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_PER_PAGE: u64 = 50;
const MAX_COUNTRY_PAGES: u64 = 200;

/// Fallback ISO2 axis when no country list was supplied at all.
const FALLBACK_COUNTRIES: [&str; 59] = [
    "US", "CA", "GB", "FR", "DE", "IT", "ES", "CH", "AT", "BE", "NL", "SE", "NO", "DK", "FI",
    "IE", "PT", "GR", "PL", "CZ", "HU", "RO", "BG", "HR", "SI", "SK", "EE", "LV", "LT", "JP",
    "CN", "KR", "TW", "HK", "SG", "MY", "TH", "ID", "PH", "VN", "IN", "AU", "NZ", "AE", "SA",
    "QA", "KW", "BH", "OM", "IL", "TR", "ZA", "EG", "BR", "MX", "AR", "CL", "CO", "RU",
];

/// Executor that sweeps a country-filter API across the country axis.
#[derive(Debug)]
pub struct CountryExecutor {
    fetcher: Fetcher,
    url: String,
    data_path: Option<String>,
    countries: BTreeMap<String, String>,
    country_id_map: BTreeMap<String, String>,
    workers: usize,
}

impl CountryExecutor {
    /// Creates a country executor over the given ISO2 → name axis.
    #[must_use]
    pub fn new(fetcher: Fetcher, url: &str, countries: BTreeMap<String, String>) -> Self {
        Self {
            fetcher,
            url: url.to_owned(),
            data_path: None,
            countries,
            country_id_map: BTreeMap::new(),
            workers: DEFAULT_WORKERS,
        }
    }

    /// Sets the dot-separated path to the record array.
    #[must_use]
    pub fn with_data_path(mut self, data_path: Option<String>) -> Self {
        self.data_path = data_path;
        self
    }

    /// Supplies the ISO2 → numeric-id map for back ends that filter by
    /// numeric country ids.
    #[must_use]
    pub fn with_country_id_map(mut self, map: BTreeMap<String, String>) -> Self {
        self.country_id_map = map;
        self
    }
}

impl Executor for CountryExecutor {
    async fn run(&self, cancel: &CancellationToken) -> Result<ExpansionOutcome, ExpandError> {
        let (base, params) = split_url(&self.url)?;

        let country_param = params
            .keys()
            .find(|k| k.to_lowercase().contains("country"))
            .cloned()
            .unwrap_or_else(|| "country".to_owned());
        let qp_param = params.keys().find(|k| k.eq_ignore_ascii_case("qp")).cloned();

        let mut axis: Vec<(String, String)> = if self.countries.is_empty() {
            FALLBACK_COUNTRIES
                .iter()
                .map(|code| ((*code).to_owned(), (*code).to_owned()))
                .collect()
        } else {
            self.countries
                .iter()
                .map(|(code, name)| (code.clone(), name.clone()))
                .collect()
        };

        // Numeric-id back ends can only be asked about countries we have
        // ids for.
        let use_id_map =
            !self.country_id_map.is_empty() && country_param.to_lowercase().contains("country_id");
        if use_id_map {
            axis.retain(|(code, _)| self.country_id_map.contains_key(code));
            log::info!("Country-id map restricts the axis to {} countries", axis.len());
        }

        let has_pagination = ["offset", "per", "per_page"]
            .iter()
            .any(|k| params.contains_key(*k));
        let per_page: u64 = ["per", "per_page"]
            .iter()
            .find_map(|k| params.get(*k))
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PER_PAGE);

        log::info!(
            "Country expansion: {} countries via '{country_param}' on {base}",
            axis.len()
        );

        let fetcher = self.fetcher.clone();
        let data_path = self.data_path.clone();
        let id_map = self.country_id_map.clone();
        let cancel_inner = cancel.clone();
        let base_params = params;

        let pool = WorkerPool::new(self.workers, COUNTRY_DELAY);
        let yields = pool
            .run(axis, cancel, move |(code, name): (String, String)| {
                let fetcher = fetcher.clone();
                let data_path = data_path.clone();
                let base = base.clone();
                let mut call_params = base_params.clone();
                let country_param = country_param.clone();
                let qp_param = qp_param.clone();
                let cancel = cancel_inner.clone();

                let param_value = if use_id_map {
                    id_map.get(&code).cloned().unwrap_or_else(|| code.clone())
                } else {
                    code.clone()
                };

                async move {
                    call_params.insert(country_param, param_value);
                    if let Some(qp) = qp_param {
                        call_params.insert(qp, name);
                    }
                    harvest_country(
                        &fetcher,
                        &base,
                        call_params,
                        data_path.as_deref(),
                        &cancel,
                        &code,
                        has_pagination,
                        per_page,
                    )
                    .await
                }
            })
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
            "Country expansion complete: {} unique records from {} countries",
            outcome.records.len(),
            outcome.report.cells_visited
        );
        Ok(outcome)
    }

    fn strategy(&self) -> &'static str {
        "country"
    }
}

/// One country's worth of calls: a single request, or offset pages until
/// the back end runs dry.
#[allow(clippy::too_many_arguments)]
async fn harvest_country(
    fetcher: &Fetcher,
    base: &url::Url,
    mut params: BTreeMap<String, String>,
    data_path: Option<&str>,
    cancel: &CancellationToken,
    code: &str,
    has_pagination: bool,
    per_page: u64,
) -> TaskYield {
    let mut result = TaskYield::default();
    let mut offset: u64 = 0;
    let mut page: u64 = 0;

    loop {
        if cancel.is_cancelled() || page >= MAX_COUNTRY_PAGES {
            break;
        }
        if has_pagination {
            params.insert("offset".to_owned(), offset.to_string());
        }
        let url = build_url(base, &params);

        let body = match fetcher.fetch(&url).await {
            Ok(Payload::Json(body)) => body,
            Ok(Payload::Text(_)) => {
                log::warn!("Non-JSON response for country {code}");
                result.failed = true;
                break;
            }
            Err(e) => {
                log::warn!("Fetch failed for country {code}: {e}");
                result.failed = true;
                break;
            }
        };

        let records = find_record_array(&body, data_path).unwrap_or_default();
        if records.is_empty() {
            break;
        }

        let batch_len = records.len() as u64;
        result.records.extend(records);
        result.pages += 1;
        page += 1;

        if !has_pagination {
            break;
        }
        if batch_len < per_page {
            break;
        }
        if let Some(total) = declared_total(&body)
            && result.records.len() as u64 >= total
        {
            break;
        }

        offset += per_page;
        tokio::time::sleep(COUNTRY_DELAY).await;
    }

    result.empty = result.records.is_empty();
    if !result.records.is_empty() {
        log::debug!("{code}: +{} records", result.records.len());
    }
    result
}
