//! Exposure raster resolution and loading
//!
//! One exposure grid per run, loaded once and shared read-only by every
//! return-period worker. Nodata and negative cells are normalised to zero
//! before any hazard masking ("no people" and "no data" contribute the
//! same nothing to a zonal sum).

use std::path::PathBuf;

use tracing::info;
use zonalgrid::{geotiff, Grid};

use crate::config::{Paths, RunConfig};
use crate::error::AnalysisError;

/// Path of the exposure raster for a run: an explicit name override, or
/// the `{COUNTRY}_{CAT}.tif` convention.
pub fn resolve_path(paths: &Paths, cfg: &RunConfig) -> PathBuf {
    let file = match &cfg.exposure_name {
        Some(name) => format!("{name}.tif"),
        None => format!("{}_{}.tif", cfg.country, cfg.exposure.code()),
    };
    paths.exposure_dir().join(file)
}

/// Load and normalise the run's exposure grid.
pub fn load(paths: &Paths, cfg: &RunConfig) -> Result<Grid<f32>, AnalysisError> {
    let path = resolve_path(paths, cfg);
    if !path.exists() {
        return Err(AnalysisError::ExposureUnavailable { path });
    }
    let mut grid = geotiff::read(&path)?;
    grid.normalize_nodata(0.0);
    info!(
        file = %path.display(),
        rows = grid.rows(),
        cols = grid.cols(),
        epsg = grid.epsg(),
        "exposure raster loaded"
    );
    Ok(grid)
}
