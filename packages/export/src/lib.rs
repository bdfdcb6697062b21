#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical CSV export and post-write validation.
//!
//! The output file always carries the full 57-column header in schema
//! order, UTF-8, LF line endings, one record per row, every field
//! present (empty when the source had nothing). Excluded records are
//! surfaced in a clearly fenced log block, never silently dropped.

use std::collections::HashSet;
use std::path::Path;

use store_harvest_schema::{CanonicalRecord, Excluded, CANONICAL_SCHEMA, REQUIRED_FIELDS};

/// Errors from export operations.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Writing or reading the CSV failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The output file is missing required header columns.
    #[error("Missing required headers: {0}")]
    MissingHeaders(String),
}

/// Writes records to a canonical CSV file.
///
/// # Errors
///
/// Returns [`ExportError`] on filesystem or CSV failures.
pub fn write_csv(records: &[CanonicalRecord], path: &Path) -> Result<(), ExportError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)?;

    writer.write_record(CANONICAL_SCHEMA)?;
    for record in records {
        writer.write_record(record.values_ordered())?;
    }
    writer.flush()?;

    log::info!("Exported {} records to {}", records.len(), path.display());
    Ok(())
}

/// Emits the excluded-stores report as a fenced log block.
pub fn log_excluded(excluded: &[Excluded]) {
    if excluded.is_empty() {
        return;
    }
    let fence = "=".repeat(80);
    log::warn!("{fence}");
    log::warn!("EXCLUDED STORES (Missing Coordinates): {} store(s)", excluded.len());
    log::warn!("{fence}");
    for (index, store) in excluded.iter().enumerate() {
        log::warn!("{}. Store Name: {}", index + 1, store.name);
        log::warn!("   Address: {}", store.address);
        log::warn!("   Reason: {}", store.reason);
    }
    log::warn!("{fence}");
}

/// Validation summary for a written CSV file.
#[derive(Debug, Clone, Default)]
pub struct ValidationSummary {
    /// Rows inspected (excluding the header).
    pub rows: usize,
    /// Rows whose coordinates are missing or out of range.
    pub bad_coordinates: usize,
    /// Handles appearing more than once.
    pub duplicate_handles: usize,
}

impl ValidationSummary {
    /// Whether the file passed all checks.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.bad_coordinates == 0 && self.duplicate_handles == 0
    }
}

/// Re-reads a written CSV and checks required headers, coordinate
/// ranges, and handle uniqueness.
///
/// # Errors
///
/// Returns [`ExportError`] when the file cannot be read or required
/// header columns are missing. Bad rows are counted, not fatal.
pub fn validate_csv(path: &Path) -> Result<ValidationSummary, ExportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .filter(|required| !headers.iter().any(|h| h == **required))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(ExportError::MissingHeaders(missing.join(", ")));
    }

    let index_of = |name: &str| headers.iter().position(|h| h == name);
    let lat_idx = index_of("Latitude");
    let lng_idx = index_of("Longitude");
    let handle_idx = index_of("Handle");

    let mut summary = ValidationSummary::default();
    let mut handles: HashSet<String> = HashSet::new();

    for row in reader.records() {
        let row = row?;
        summary.rows += 1;

        let lat = lat_idx.and_then(|i| row.get(i)).unwrap_or("");
        let lng = lng_idx.and_then(|i| row.get(i)).unwrap_or("");
        if !coordinate_ok(lat, -90.0, 90.0) || !coordinate_ok(lng, -180.0, 180.0) {
            summary.bad_coordinates += 1;
            log::warn!("Row {}: invalid coordinates '{lat}', '{lng}'", summary.rows);
        }

        if let Some(handle) = handle_idx.and_then(|i| row.get(i))
            && !handle.is_empty()
            && !handles.insert(handle.to_owned())
        {
            summary.duplicate_handles += 1;
            log::warn!("Row {}: duplicate handle '{handle}'", summary.rows);
        }
    }

    Ok(summary)
}

fn coordinate_ok(value: &str, min: f64, max: f64) -> bool {
    if value.is_empty() {
        return false;
    }
    value
        .parse::<f64>()
        .is_ok_and(|v| v.is_finite() && v >= min && v <= max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(handle: &str, lat: &str, lng: &str) -> CanonicalRecord {
        let mut record = CanonicalRecord::new();
        record.set("Handle", handle);
        record.set("Name", "Store");
        record.set("Status", "TRUE");
        record.set("Latitude", lat);
        record.set("Longitude", lng);
        record
    }

    #[test]
    fn writes_header_and_rows_with_lf_endings() {
        let dir = std::env::temp_dir().join("store_harvest_export_test_lf");
        let path = dir.join("locations.csv");
        let records = vec![sample_record("a-nyc", "40.7128000", "-74.0060000")];
        write_csv(&records, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("\r\n"));
        let mut lines = content.lines();
        let header = lines.next().unwrap();
        assert_eq!(header.split(',').count(), CANONICAL_SCHEMA.len());
        assert!(header.starts_with("Handle,Name,Status"));
        // The " Tags" header keeps its leading space.
        assert!(content.contains(", Tags,"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn validates_good_output() {
        let dir = std::env::temp_dir().join("store_harvest_export_test_ok");
        let path = dir.join("locations.csv");
        let records = vec![
            sample_record("a", "40.7128000", "-74.0060000"),
            sample_record("b", "-33.8688000", "151.2093000"),
        ];
        write_csv(&records, &path).unwrap();

        let summary = validate_csv(&path).unwrap();
        assert_eq!(summary.rows, 2);
        assert!(summary.is_valid());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn flags_bad_coordinates_and_duplicate_handles() {
        let dir = std::env::temp_dir().join("store_harvest_export_test_bad");
        let path = dir.join("locations.csv");
        let records = vec![
            sample_record("dup", "95.0", "10.0"),
            sample_record("dup", "40.0", "-74.0"),
        ];
        write_csv(&records, &path).unwrap();

        let summary = validate_csv(&path).unwrap();
        assert_eq!(summary.bad_coordinates, 1);
        assert_eq!(summary.duplicate_handles, 1);
        assert!(!summary.is_valid());
        std::fs::remove_dir_all(&dir).ok();
    }
}
