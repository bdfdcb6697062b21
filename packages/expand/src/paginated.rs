//! Paginated executor: walk pages until the back end runs dry.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use store_harvest_fetch::{Fetcher, Payload};

use crate::containers::{declared_total, find_record_array};
use crate::{build_url, split_url, ExpandError, ExpansionOutcome, Executor, IdentitySet};

/// Safety cap on pages walked for one endpoint.
pub const MAX_PAGES: u64 = 1000;

/// Default page size requested when the URL does not carry one.
pub const DEFAULT_PAGE_LIMIT: u64 = 50;

const PAGE_DELAY: Duration = Duration::from_millis(300);

/// How the endpoint advances between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStyle {
    /// `?page=N`
    Page,
    /// `?offset=N&limit=M`
    Offset,
    /// Opaque continuation token.
    Token,
}

/// Executor for endpoints that split the full list across pages.
#[derive(Debug)]
pub struct PaginatedExecutor {
    fetcher: Fetcher,
    url: String,
    data_path: Option<String>,
    forced_style: Option<PageStyle>,
}

impl PaginatedExecutor {
    /// Creates a paginated executor.
    #[must_use]
    pub fn new(fetcher: Fetcher, url: &str) -> Self {
        Self {
            fetcher,
            url: url.to_owned(),
            data_path: None,
            forced_style: None,
        }
    }

    /// Sets the dot-separated path to the record array.
    #[must_use]
    pub fn with_data_path(mut self, data_path: Option<String>) -> Self {
        self.data_path = data_path;
        self
    }

    /// Pins the pagination style instead of detecting it from the URL.
    #[must_use]
    pub const fn with_style(mut self, style: PageStyle) -> Self {
        self.forced_style = Some(style);
        self
    }
}

/// Pagination parameters discovered on (or defaulted onto) the URL.
#[derive(Debug)]
struct PageParams {
    style: PageStyle,
    page_param: String,
    offset_param: String,
    token_param: String,
    limit: u64,
}

fn detect_params(params: &BTreeMap<String, String>, forced: Option<PageStyle>) -> PageParams {
    let mut page_param = None;
    let mut token_param = None;
    let mut offset_param = None;
    let mut limit_param = None;

    for key in params.keys() {
        let lower = key.to_lowercase();
        if lower.contains("page") && !lower.contains("token") {
            page_param.get_or_insert_with(|| key.clone());
        }
        if lower.contains("token") {
            token_param.get_or_insert_with(|| key.clone());
        }
        if lower == "offset" {
            offset_param.get_or_insert_with(|| key.clone());
        }
        if lower.contains("limit") || lower == "per" || lower.contains("per_page") {
            limit_param.get_or_insert_with(|| key.clone());
        }
    }

    let style = forced.unwrap_or(if token_param.is_some() {
        PageStyle::Token
    } else if offset_param.is_some() {
        PageStyle::Offset
    } else {
        PageStyle::Page
    });

    let limit = limit_param
        .as_ref()
        .and_then(|p| params.get(p))
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PAGE_LIMIT);

    PageParams {
        style,
        page_param: page_param.unwrap_or_else(|| "page".to_owned()),
        offset_param: offset_param.unwrap_or_else(|| "offset".to_owned()),
        token_param: token_param.unwrap_or_else(|| "pageToken".to_owned()),
        limit,
    }
}

impl Executor for PaginatedExecutor {
    async fn run(&self, cancel: &CancellationToken) -> Result<ExpansionOutcome, ExpandError> {
        let (base, base_params) = split_url(&self.url)?;
        let page_params = detect_params(&base_params, self.forced_style);
        log::info!(
            "Paginating {} ({:?}, limit {})",
            base,
            page_params.style,
            page_params.limit
        );

        let mut outcome = ExpansionOutcome::default();
        let mut identities = IdentitySet::new();
        let mut page: u64 = 1;
        let mut offset: u64 = 0;
        let mut token: Option<String> = None;

        while page <= MAX_PAGES {
            if cancel.is_cancelled() {
                log::info!("Pagination cancelled after {} pages", page - 1);
                break;
            }

            let url = build_page_url(&base, &base_params, &page_params, page, offset, token.as_deref());
            let Payload::Json(body) = self.fetcher.fetch(&url).await? else {
                log::warn!("Non-JSON page at {url}, stopping pagination");
                outcome.report.failed_calls += 1;
                break;
            };

            let Some(records) = find_record_array(&body, self.data_path.as_deref()) else {
                break;
            };
            if records.is_empty() {
                break;
            }

            let batch_len = records.len() as u64;
            let fresh = identities.filter_new(records, &mut outcome.report);
            outcome.records.extend(fresh);
            outcome.report.pages_walked += 1;
            log::debug!(
                "Page {page}: {batch_len} records ({} total)",
                outcome.records.len()
            );

            match page_params.style {
                PageStyle::Token => {
                    token = next_token(&body, &page_params.token_param);
                    if token.is_none() {
                        break;
                    }
                }
                PageStyle::Offset => {
                    if let Some(total) = declared_total(&body)
                        && outcome.records.len() as u64 >= total
                    {
                        break;
                    }
                    if batch_len < page_params.limit {
                        break;
                    }
                    offset += page_params.limit;
                }
                PageStyle::Page => {
                    if body.get("has_more").and_then(Value::as_bool) == Some(false) {
                        break;
                    }
                    if matches!(body.get("next"), Some(Value::Null)) {
                        break;
                    }
                    if let Some(total) = declared_total(&body)
                        && outcome.records.len() as u64 >= total
                    {
                        break;
                    }
                    if batch_len < page_params.limit {
                        break;
                    }
                }
            }

            page += 1;
            tokio::time::sleep(PAGE_DELAY).await;
        }

        if page > MAX_PAGES {
            log::warn!("Hit the {MAX_PAGES}-page cap for {}", self.url);
        }

        Ok(outcome)
    }

    fn strategy(&self) -> &'static str {
        "paginated"
    }
}

fn build_page_url(
    base: &Url,
    base_params: &BTreeMap<String, String>,
    page_params: &PageParams,
    page: u64,
    offset: u64,
    token: Option<&str>,
) -> String {
    let mut params = base_params.clone();
    // Make sure the back end knows the page size we terminate against.
    if !params.keys().any(|k| {
        let lower = k.to_lowercase();
        lower.contains("limit") || lower == "per" || lower.contains("per_page")
    }) {
        params.insert("limit".to_owned(), page_params.limit.to_string());
    }

    match page_params.style {
        PageStyle::Token => {
            params.remove(&page_params.page_param);
            params.remove(&page_params.offset_param);
            if let Some(token) = token {
                params.insert(page_params.token_param.clone(), token.to_owned());
            } else {
                params.remove(&page_params.token_param);
            }
        }
        PageStyle::Offset => {
            params.remove(&page_params.page_param);
            params.remove(&page_params.token_param);
            params.insert(page_params.offset_param.clone(), offset.to_string());
        }
        PageStyle::Page => {
            params.remove(&page_params.token_param);
            params.remove(&page_params.offset_param);
            params.insert(page_params.page_param.clone(), page.to_string());
        }
    }

    build_url(base, &params)
}

fn next_token(body: &Value, token_param: &str) -> Option<String> {
    for key in [token_param, "pageToken", "nextPageToken"] {
        if let Some(token) = body.get(key).and_then(Value::as_str)
            && !token.is_empty()
        {
            return Some(token.to_owned());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn detects_offset_style() {
        let detected = detect_params(&params(&[("offset", "0"), ("per", "25")]), None);
        assert_eq!(detected.style, PageStyle::Offset);
        assert_eq!(detected.limit, 25);
    }

    #[test]
    fn detects_token_style() {
        let detected = detect_params(&params(&[("pageToken", "abc")]), None);
        assert_eq!(detected.style, PageStyle::Token);
    }

    #[test]
    fn defaults_to_page_style() {
        let detected = detect_params(&params(&[("brand", "x")]), None);
        assert_eq!(detected.style, PageStyle::Page);
        assert_eq!(detected.limit, DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn page_url_carries_only_its_style_params() {
        let base = Url::parse("https://api.example.com/stores").unwrap();
        let base_params = params(&[("pageToken", "old"), ("offset", "10"), ("q", "x")]);
        let page_params = detect_params(&base_params, Some(PageStyle::Page));
        let url = build_page_url(&base, &base_params, &page_params, 3, 0, None);
        assert!(url.contains("page=3"));
        assert!(!url.contains("pageToken"));
        assert!(!url.contains("offset"));
        assert!(url.contains("q=x"));
    }

    #[test]
    fn token_extraction() {
        assert_eq!(
            next_token(&json!({"pageToken": "next"}), "pageToken").as_deref(),
            Some("next")
        );
        assert_eq!(next_token(&json!({"pageToken": ""}), "pageToken"), None);
        assert_eq!(next_token(&json!({"done": true}), "pageToken"), None);
    }
}
