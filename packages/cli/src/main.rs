#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Command-line front end for the store harvester.
//!
//! Point it at any store-locator URL; it auto-detects the interaction
//! pattern, drives the back end to completeness, and writes a canonical
//! `locations.csv`. Exit code 0 means the run completed (even with zero
//! records); non-zero means an unrecoverable error.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use store_harvest_classify::EndpointPattern;
use store_harvest_config::BrandConfig;
use store_harvest_pipeline::{harvest, HarvestArgs};

#[derive(Parser)]
#[command(name = "store_harvest_cli", about = "Universal store locator harvester")]
struct Cli {
    /// Store locator URL or API endpoint
    #[arg(long)]
    url: String,

    /// Output CSV file
    #[arg(short, long, default_value = "output/locations.csv")]
    output: PathBuf,

    /// Region to cover when expansion is needed (world, north_america,
    /// europe, asia, ...)
    #[arg(long, default_value = "world")]
    region: String,

    /// Force a specific endpoint pattern instead of auto-detecting
    /// (single, paginated, viewport, radius, country, html_embedded)
    #[arg(long = "type")]
    forced_type: Option<String>,

    /// Brand configuration: inline JSON, or a path to a JSON file
    #[arg(long)]
    brand_config: Option<String>,

    /// Brand id to select when the configuration file holds several
    #[arg(long)]
    brand: Option<String>,

    /// Skip validating the written CSV
    #[arg(long)]
    no_validate: bool,

    /// Do not call the geocoder for records missing coordinates
    #[arg(long)]
    no_geocode: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let start = Instant::now();

    let forced_pattern = match cli.forced_type.as_deref() {
        Some(name) => Some(
            EndpointPattern::parse(name).ok_or_else(|| format!("Unknown pattern: {name}"))?,
        ),
        None => None,
    };

    let brand_config = match cli.brand_config.as_deref() {
        Some(config) => Some(load_brand_config(config, cli.brand.as_deref())?),
        None => None,
    };

    // Ctrl-C cancels at the next suspension point; partial output is
    // still written.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, draining workers...");
            signal_cancel.cancel();
        }
    });

    let args = HarvestArgs {
        url: cli.url,
        region: cli.region,
        forced_pattern,
        brand_config,
        geocode_missing: !cli.no_geocode,
    };

    let result = harvest(args, &cancel).await?;

    store_harvest_export::write_csv(&result.records, &cli.output)?;
    store_harvest_export::log_excluded(&result.excluded);

    if cli.no_validate {
        log::info!("Validation skipped");
    } else {
        let summary = store_harvest_export::validate_csv(&cli.output)?;
        if summary.is_valid() {
            log::info!("Output valid ({} rows)", summary.rows);
        } else {
            log::warn!(
                "Output has issues: {} bad coordinate row(s), {} duplicate handle(s)",
                summary.bad_coordinates,
                summary.duplicate_handles
            );
        }
    }

    let stats = &result.stats;
    println!("Pattern:    {}", stats.pattern.name());
    println!(
        "Records:    {} fetched, {} normalized, {} excluded, {} duplicates",
        stats.fetched, stats.normalized, stats.excluded, stats.duplicates
    );
    println!(
        "Work:       {} pages, {} cells ({} empty), {} failed calls",
        stats.report.pages_walked,
        stats.report.cells_visited,
        stats.report.empty_cells,
        stats.report.failed_calls
    );
    if let Some(locked) = stats.optimizer_locked {
        println!(
            "Optimizer:  {}",
            if locked { "configuration locked" } else { "no working configuration" }
        );
    }
    for warning in &stats.warnings {
        println!("Warning:    {warning}");
    }
    println!("Output:     {}", cli.output.display());
    println!("Elapsed:    {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}

/// Loads brand configuration from inline JSON or a file path.
fn load_brand_config(
    source: &str,
    brand_id: Option<&str>,
) -> Result<BrandConfig, Box<dyn std::error::Error>> {
    let trimmed = source.trim();
    let config = if trimmed.starts_with('{') {
        BrandConfig::from_json(trimmed, brand_id)?
    } else {
        BrandConfig::from_file(std::path::Path::new(trimmed), brand_id)?
    };
    Ok(config)
}
