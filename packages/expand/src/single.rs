//! Single-call executor: one GET returns everything.

use tokio_util::sync::CancellationToken;

use store_harvest_fetch::{Fetcher, Payload};

use crate::containers::find_record_array;
use crate::{html, ExpandError, ExpansionOutcome, Executor};

/// Executor for endpoints that hand over the full dataset in one call.
/// HTML responses fall through to the embedded-data extractors.
#[derive(Debug)]
pub struct SingleExecutor {
    fetcher: Fetcher,
    url: String,
    data_path: Option<String>,
}

impl SingleExecutor {
    /// Creates a single-call executor.
    #[must_use]
    pub fn new(fetcher: Fetcher, url: &str) -> Self {
        Self {
            fetcher,
            url: url.to_owned(),
            data_path: None,
        }
    }

    /// Sets the dot-separated path to the record array.
    #[must_use]
    pub fn with_data_path(mut self, data_path: Option<String>) -> Self {
        self.data_path = data_path;
        self
    }
}

impl Executor for SingleExecutor {
    async fn run(&self, cancel: &CancellationToken) -> Result<ExpansionOutcome, ExpandError> {
        if cancel.is_cancelled() {
            return Err(ExpandError::Cancelled);
        }

        let mut outcome = ExpansionOutcome::default();
        let payload = self.fetcher.fetch(&self.url).await?;
        outcome.report.pages_walked = 1;

        match payload {
            Payload::Json(body) => {
                match find_record_array(&body, self.data_path.as_deref()) {
                    Some(records) => {
                        log::info!("Single call returned {} records", records.len());
                        outcome.records = records;
                    }
                    None => {
                        log::warn!("No record array found in response from {}", self.url);
                        outcome.report.empty_cells = 1;
                    }
                }
            }
            Payload::Text(html) => {
                log::info!("Response is HTML, running embedded extractors");
                outcome.records = html::extract_stores(&html);
                if outcome.records.is_empty() {
                    outcome.report.empty_cells = 1;
                }
            }
        }

        Ok(outcome)
    }

    fn strategy(&self) -> &'static str {
        "single"
    }
}
