//! Viewport executor: tile a region into bounding boxes and query each.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use store_harvest_fetch::{Fetcher, Payload};

use crate::containers::find_record_array;
use crate::pool::{TaskYield, WorkerPool, DEFAULT_WORKERS};
use crate::{build_url, split_url, ExpandError, ExpansionOutcome, Executor, IdentitySet};

/// Default cell edge in degrees. Smaller grids cost quadratically more
/// calls.
pub const DEFAULT_GRID_SIZE: f64 = 20.0;

const CELL_DELAY: Duration = Duration::from_millis(500);

/// One grid cell, addressed by its south-west and north-east corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    /// South-west latitude.
    pub sw_lat: f64,
    /// South-west longitude.
    pub sw_lng: f64,
    /// North-east latitude.
    pub ne_lat: f64,
    /// North-east longitude.
    pub ne_lng: f64,
}

/// A rectangular region to tile.
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    /// Southern edge.
    pub min_lat: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Western edge.
    pub min_lng: f64,
    /// Eastern edge.
    pub max_lng: f64,
}

/// The whole world.
pub const WORLD: Bounds = Bounds {
    min_lat: -90.0,
    max_lat: 90.0,
    min_lng: -180.0,
    max_lng: 180.0,
};

/// Named region presets for focused harvests.
#[must_use]
pub fn region_preset(region: &str) -> Option<Bounds> {
    let bounds = match region.trim().to_lowercase().as_str() {
        "north_america" => centered(45.0, -100.0, 35.0),
        "usa" => Bounds {
            min_lat: 24.5,
            max_lat: 49.4,
            min_lng: -125.0,
            max_lng: -66.9,
        },
        "europe" => centered(50.0, 10.0, 25.0),
        "uk" => Bounds {
            min_lat: 49.9,
            max_lat: 60.9,
            min_lng: -8.2,
            max_lng: 1.8,
        },
        "asia" => centered(34.0, 100.0, 40.0),
        "japan" => Bounds {
            min_lat: 24.0,
            max_lat: 46.0,
            min_lng: 123.0,
            max_lng: 154.0,
        },
        "china" => Bounds {
            min_lat: 18.0,
            max_lat: 54.0,
            min_lng: 73.0,
            max_lng: 135.0,
        },
        "australia" => Bounds {
            min_lat: -44.0,
            max_lat: -10.0,
            min_lng: 113.0,
            max_lng: 154.0,
        },
        "middle_east" => centered(29.0, 47.0, 20.0),
        _ => return None,
    };
    Some(bounds)
}

fn centered(center_lat: f64, center_lng: f64, radius_degrees: f64) -> Bounds {
    Bounds {
        min_lat: (center_lat - radius_degrees).max(-90.0),
        max_lat: (center_lat + radius_degrees).min(90.0),
        min_lng: (center_lng - radius_degrees).max(-180.0),
        max_lng: (center_lng + radius_degrees).min(180.0),
    }
}

/// Tiles a region into cells of the given angular size.
#[must_use]
pub fn generate_grid(bounds: Bounds, grid_size: f64) -> Vec<Cell> {
    let mut cells = Vec::new();
    if grid_size <= 0.0 {
        return cells;
    }
    let mut lat = bounds.min_lat;
    while lat < bounds.max_lat {
        let mut lng = bounds.min_lng;
        while lng < bounds.max_lng {
            cells.push(Cell {
                sw_lat: lat,
                sw_lng: lng,
                ne_lat: (lat + grid_size).min(bounds.max_lat),
                ne_lng: (lng + grid_size).min(bounds.max_lng),
            });
            lng += grid_size;
        }
        lat += grid_size;
    }
    cells
}

/// Query parameter names for the four cell corners.
#[derive(Debug, Clone)]
pub struct ViewportParams {
    ne_lat: String,
    ne_lng: String,
    sw_lat: String,
    sw_lng: String,
}

impl Default for ViewportParams {
    fn default() -> Self {
        Self {
            ne_lat: "northEastLat".to_owned(),
            ne_lng: "northEastLng".to_owned(),
            sw_lat: "southWestLat".to_owned(),
            sw_lng: "southWestLng".to_owned(),
        }
    }
}

impl ViewportParams {
    /// Detects corner parameter names already on the URL, defaulting to
    /// the `northEastLat` family.
    #[must_use]
    pub fn detect(params: &BTreeMap<String, String>) -> Self {
        let mut detected = Self::default();
        for key in params.keys() {
            let normalized = key.to_lowercase().replace(['_', '-'], "");
            match normalized.as_str() {
                "northeastlat" | "nelat" => detected.ne_lat = key.clone(),
                "northeastlng" | "northeastlon" | "northeastlong" | "nelng" | "nelon"
                | "nelong" => detected.ne_lng = key.clone(),
                "southwestlat" | "swlat" => detected.sw_lat = key.clone(),
                "southwestlng" | "southwestlon" | "southwestlong" | "swlng" | "swlon"
                | "swlong" => detected.sw_lng = key.clone(),
                _ => {}
            }
        }
        detected
    }

    fn all_names(&self) -> [&str; 4] {
        [&self.ne_lat, &self.ne_lng, &self.sw_lat, &self.sw_lng]
    }
}

/// Executor for bounding-box APIs: visits every cell of a grid and
/// unions the results.
#[derive(Debug)]
pub struct ViewportExecutor {
    fetcher: Fetcher,
    url: String,
    data_path: Option<String>,
    bounds: Bounds,
    grid_size: f64,
    workers: usize,
}

impl ViewportExecutor {
    /// Creates a viewport executor covering the world at the default
    /// grid size.
    #[must_use]
    pub fn new(fetcher: Fetcher, url: &str) -> Self {
        Self {
            fetcher,
            url: url.to_owned(),
            data_path: None,
            bounds: WORLD,
            grid_size: DEFAULT_GRID_SIZE,
            workers: DEFAULT_WORKERS,
        }
    }

    /// Sets the dot-separated path to the record array.
    #[must_use]
    pub fn with_data_path(mut self, data_path: Option<String>) -> Self {
        self.data_path = data_path;
        self
    }

    /// Restricts the harvest to a region.
    #[must_use]
    pub const fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Overrides the cell size in degrees.
    #[must_use]
    pub const fn with_grid_size(mut self, grid_size: f64) -> Self {
        self.grid_size = grid_size;
        self
    }

    /// Overrides worker parallelism.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

impl Executor for ViewportExecutor {
    async fn run(&self, cancel: &CancellationToken) -> Result<ExpansionOutcome, ExpandError> {
        let (base, mut params) = split_url(&self.url)?;
        let viewport_params = ViewportParams::detect(&params);

        // Corner and center params are replaced per cell.
        for name in viewport_params.all_names() {
            params.remove(name);
        }
        params.remove("lat");
        params.remove("lng");

        let cells = generate_grid(self.bounds, self.grid_size);
        log::info!(
            "Viewport expansion: {} cells at {}° over {}",
            cells.len(),
            self.grid_size,
            base
        );

        let fetcher = self.fetcher.clone();
        let data_path = self.data_path.clone();
        let viewport_names = viewport_params.clone();
        let base_params = params;

        let pool = WorkerPool::new(self.workers, CELL_DELAY);
        let yields = pool
            .run(cells, cancel, move |cell: Cell| {
                let fetcher = fetcher.clone();
                let data_path = data_path.clone();
                let names = viewport_names.clone();
                let mut cell_params = base_params.clone();
                let base = base.clone();
                async move {
                    cell_params.insert(names.ne_lat.clone(), format!("{}", cell.ne_lat));
                    cell_params.insert(names.ne_lng.clone(), format!("{}", cell.ne_lng));
                    cell_params.insert(names.sw_lat.clone(), format!("{}", cell.sw_lat));
                    cell_params.insert(names.sw_lng.clone(), format!("{}", cell.sw_lng));
                    let url = build_url(&base, &cell_params);

                    match fetcher.fetch(&url).await {
                        Ok(Payload::Json(body)) => {
                            let records =
                                find_record_array(&body, data_path.as_deref()).unwrap_or_default();
                            TaskYield {
                                empty: records.is_empty(),
                                pages: 1,
                                records,
                                failed: false,
                            }
                        }
                        Ok(Payload::Text(_)) => TaskYield {
                            empty: true,
                            pages: 1,
                            ..TaskYield::default()
                        },
                        Err(e) => {
                            log::warn!("Viewport cell failed: {e}");
                            TaskYield {
                                failed: true,
                                ..TaskYield::default()
                            }
                        }
                    }
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
            "Viewport expansion complete: {} unique records from {} cells ({} empty)",
            outcome.records.len(),
            outcome.report.cells_visited,
            outcome.report.empty_cells
        );
        Ok(outcome)
    }

    fn strategy(&self) -> &'static str {
        "viewport"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_grid_at_ninety_degrees_has_eight_cells() {
        let cells = generate_grid(WORLD, 90.0);
        assert_eq!(cells.len(), 8);
    }

    #[test]
    fn world_grid_at_default_size() {
        let cells = generate_grid(WORLD, DEFAULT_GRID_SIZE);
        assert_eq!(cells.len(), 9 * 18);
    }

    #[test]
    fn cells_clamp_to_bounds() {
        let cells = generate_grid(
            Bounds {
                min_lat: 0.0,
                max_lat: 50.0,
                min_lng: 0.0,
                max_lng: 50.0,
            },
            20.0,
        );
        let last = cells.last().unwrap();
        assert!((last.ne_lat - 50.0).abs() < f64::EPSILON);
        assert!((last.ne_lng - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn detects_corner_param_names() {
        let mut params = BTreeMap::new();
        params.insert("ne_lat".to_owned(), "1".to_owned());
        params.insert("ne_lng".to_owned(), "2".to_owned());
        params.insert("sw_lat".to_owned(), "3".to_owned());
        params.insert("sw_lng".to_owned(), "4".to_owned());
        let detected = ViewportParams::detect(&params);
        assert_eq!(detected.ne_lat, "ne_lat");
        assert_eq!(detected.sw_lng, "sw_lng");
    }

    #[test]
    fn region_presets_exist() {
        assert!(region_preset("europe").is_some());
        assert!(region_preset("japan").is_some());
        assert!(region_preset("atlantis").is_none());
    }
}
