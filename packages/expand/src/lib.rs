#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Expansion executors.
//!
//! Region- and page-limited locator back ends never hand over everything
//! at once; each executor here knows how to drive one interaction
//! pattern to completeness: a single call, page iteration, a world grid
//! of viewports, a ring of radius searches around major cities, a
//! country-by-country sweep, or extraction from an HTML page.
//!
//! All executors share one contract: yield raw records in arrival order,
//! deduplicate within their own stream by source identity, and report
//! how much work they did. Final deduplication happens downstream in the
//! normalizer.

pub mod containers;
pub mod country;
pub mod html;
pub mod identity;
pub mod paginated;
pub mod pool;
pub mod radius;
pub mod single;
pub mod viewport;

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;
use url::Url;

pub use identity::source_identity;

/// Errors from expansion runs.
#[derive(Debug, thiserror::Error)]
pub enum ExpandError {
    /// Fetching failed beyond recovery.
    #[error("Fetch error: {0}")]
    Fetch(#[from] store_harvest_fetch::FetchError),

    /// The endpoint URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The run was cancelled before completion.
    #[error("Cancelled")]
    Cancelled,
}

/// Work accounting reported by every executor alongside its records.
#[derive(Debug, Clone, Default)]
pub struct ExpansionReport {
    /// Pages fetched across all calls.
    pub pages_walked: u64,
    /// Grid cells / cities / countries visited.
    pub cells_visited: u64,
    /// Cells or calls that returned nothing.
    pub empty_cells: u64,
    /// Records dropped as in-stream duplicates (by source identity).
    pub dedup_rejected: u64,
    /// Calls that failed after retries and were skipped.
    pub failed_calls: u64,
}

impl ExpansionReport {
    /// Merges another report into this one.
    pub fn merge(&mut self, other: &Self) {
        self.pages_walked += other.pages_walked;
        self.cells_visited += other.cells_visited;
        self.empty_cells += other.empty_cells;
        self.dedup_rejected += other.dedup_rejected;
        self.failed_calls += other.failed_calls;
    }
}

/// Records plus the work report for one expansion run.
#[derive(Debug, Default)]
pub struct ExpansionOutcome {
    /// Raw records in arrival order, deduplicated by source identity.
    pub records: Vec<serde_json::Value>,
    /// Work accounting.
    pub report: ExpansionReport,
}

/// Common interface over the concrete executors.
pub trait Executor: Send + Sync {
    /// Drives the back end to completeness.
    ///
    /// # Errors
    ///
    /// Returns [`ExpandError`] only for unrecoverable failures (bad URL,
    /// cancellation); per-call failures are absorbed into the report.
    fn run(
        &self,
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = Result<ExpansionOutcome, ExpandError>> + Send;

    /// Name of the expansion strategy (e.g. `"viewport"`).
    fn strategy(&self) -> &'static str;
}

/// Splits a URL into its parameterless base and its query parameters.
///
/// # Errors
///
/// Returns [`ExpandError::InvalidUrl`] when the URL does not parse.
pub fn split_url(url: &str) -> Result<(Url, BTreeMap<String, String>), ExpandError> {
    let parsed = Url::parse(url)?;
    let params: BTreeMap<String, String> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut base = parsed;
    base.set_query(None);
    Ok((base, params))
}

/// Builds a request URL from a base and a parameter map.
#[must_use]
pub fn build_url(base: &Url, params: &BTreeMap<String, String>) -> String {
    if params.is_empty() {
        return base.to_string();
    }
    let mut url = base.clone();
    url.query_pairs_mut().clear().extend_pairs(params.iter());
    url.to_string()
}

/// In-stream deduplication state shared by the multi-call executors.
#[derive(Debug, Default)]
pub struct IdentitySet {
    seen: std::collections::HashSet<String>,
}

impl IdentitySet {
    /// Creates an empty identity set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters a batch down to records not seen before. Records without
    /// any derivable identity are passed through with a warning.
    pub fn filter_new(
        &mut self,
        records: Vec<serde_json::Value>,
        report: &mut ExpansionReport,
    ) -> Vec<serde_json::Value> {
        let mut fresh = Vec::new();
        for record in records {
            match source_identity(&record) {
                Some(id) => {
                    if self.seen.insert(id) {
                        fresh.push(record);
                    } else {
                        report.dedup_rejected += 1;
                    }
                }
                None => {
                    log::warn!(
                        "Record without source identity kept as-is: {}",
                        record.get("name").and_then(serde_json::Value::as_str).unwrap_or("<unnamed>")
                    );
                    fresh.push(record);
                }
            }
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_and_rebuild_url() {
        let (base, params) =
            split_url("https://api.example.com/stores?country=US&per=50").unwrap();
        assert_eq!(base.as_str(), "https://api.example.com/stores");
        assert_eq!(params["country"], "US");
        assert_eq!(params["per"], "50");

        let rebuilt = build_url(&base, &params);
        assert!(rebuilt.contains("country=US"));
        assert!(rebuilt.contains("per=50"));
    }

    #[test]
    fn identity_set_filters_duplicates() {
        let mut set = IdentitySet::new();
        let mut report = ExpansionReport::default();
        let batch = vec![json!({"id": "a"}), json!({"id": "a"}), json!({"id": "b"})];
        let fresh = set.filter_new(batch, &mut report);
        assert_eq!(fresh.len(), 2);
        assert_eq!(report.dedup_rejected, 1);
    }

    #[test]
    fn unkeyed_records_pass_through() {
        let mut set = IdentitySet::new();
        let mut report = ExpansionReport::default();
        let batch = vec![json!({"weird": 1}), json!({"weird": 1})];
        let fresh = set.filter_new(batch, &mut report);
        assert_eq!(fresh.len(), 2);
        assert_eq!(report.dedup_rejected, 0);
    }
}
