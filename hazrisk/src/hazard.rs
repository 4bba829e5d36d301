//! Hazard raster store
//!
//! Hazard stacks live on disk as one GeoTIFF per return period named
//! `1in{rp}.tif`. Loading aligns the raster onto the exposure gridding;
//! a missing or unreadable file aborts the whole run (no partial-success
//! mode).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;
use zonalgrid::{geotiff, resample, Grid, GridError};

use crate::error::AnalysisError;

/// Resolves return periods to hazard raster files.
#[derive(Debug, Clone)]
pub struct HazardStore {
    dir: PathBuf,
    /// Explicit per-RP file mapping (custom hazard runs); falls back to the
    /// `1in{rp}.tif` convention when absent.
    explicit: HashMap<u32, PathBuf>,
}

impl HazardStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            explicit: HashMap::new(),
        }
    }

    pub fn with_files(mut self, files: HashMap<u32, PathBuf>) -> Self {
        self.explicit = files;
        self
    }

    pub fn path_for(&self, rp: u32) -> PathBuf {
        self.explicit
            .get(&rp)
            .cloned()
            .unwrap_or_else(|| self.dir.join(format!("1in{rp}.tif")))
    }

    /// Path for an RP, failing when the file does not exist.
    pub fn resolve(&self, rp: u32) -> Result<PathBuf, AnalysisError> {
        let path = self.path_for(rp);
        if path.exists() {
            Ok(path)
        } else {
            Err(AnalysisError::HazardUnavailable { rp, path })
        }
    }

    /// Return periods available on disk, ascending (scan for `1in{rp}.tif`).
    pub fn discover(&self) -> Result<Vec<u32>, AnalysisError> {
        let re = Regex::new(r"^1in(\d+)\.tif$").unwrap_or_else(|_| unreachable!("static pattern"));
        let mut rps = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(caps) = re.captures(name) {
                if let Ok(rp) = caps[1].parse::<u32>() {
                    rps.push(rp);
                }
            }
        }
        rps.sort_unstable();
        Ok(rps)
    }

    /// Load one RP's hazard grid aligned onto the target gridding.
    pub fn load_aligned(&self, rp: u32, target: &Grid<f32>) -> Result<Grid<f32>, AnalysisError> {
        let path = self.resolve(rp)?;
        let raw = geotiff::read(&path).map_err(|source| AnalysisError::HazardRead {
            rp,
            path: path.clone(),
            source,
        })?;
        debug!(rp, file = %path.display(), rows = raw.rows(), cols = raw.cols(), "hazard raster loaded");
        align(raw, target, rp, &path)
    }
}

fn align(
    source: Grid<f32>,
    target: &Grid<f32>,
    rp: u32,
    path: &Path,
) -> Result<Grid<f32>, AnalysisError> {
    match resample::align_to(
        &source,
        target.transform(),
        target.rows(),
        target.cols(),
        target.epsg(),
    ) {
        Ok(grid) => Ok(grid),
        Err(GridError::CrsMismatch { source_epsg: src, target: dst }) => {
            align_cross_crs(&source, target).ok_or(AnalysisError::Alignment {
                source_epsg: src,
                target_epsg: dst,
            })
        }
        Err(source) => Err(AnalysisError::HazardRead {
            rp,
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// PROJ-backed fallback for hazard grids in a different CRS than the
/// exposure grid: each target cell centre is transformed into the source
/// CRS and sampled nearest-neighbour.
#[cfg(feature = "reproject")]
fn align_cross_crs(source: &Grid<f32>, target: &Grid<f32>) -> Option<Grid<f32>> {
    use ndarray::Array2;

    let transformer = proj::Proj::new_known_crs(
        &format!("EPSG:{}", target.epsg()),
        &format!("EPSG:{}", source.epsg()),
        None,
    )
    .ok()?;

    let nodata = source.nodata().map(|v| v as f32);
    let (rows, cols) = (target.rows(), target.cols());
    let mut data = Array2::<f32>::from_elem((rows, cols), f32::NAN);
    for row in 0..rows {
        for col in 0..cols {
            let (x, y) = target.transform().cell_center(row, col);
            let Ok((sx, sy)) = transformer.convert((x, y)) else {
                continue;
            };
            let (src_row, src_col) = source.transform().world_to_pixel(sx, sy);
            let (src_row, src_col) = (src_row.floor(), src_col.floor());
            if src_row < 0.0
                || src_col < 0.0
                || src_row >= source.rows() as f64
                || src_col >= source.cols() as f64
            {
                continue;
            }
            let v = source.data()[[src_row as usize, src_col as usize]];
            if v.is_nan() || Some(v) == nodata {
                continue;
            }
            data[[row, col]] = v;
        }
    }
    Grid::new(data, *target.transform(), target.epsg()).ok()
}

#[cfg(not(feature = "reproject"))]
fn align_cross_crs(_source: &Grid<f32>, _target: &Grid<f32>) -> Option<Grid<f32>> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use zonalgrid::GeoTransform;

    fn target_grid() -> Grid<f32> {
        Grid::new(
            Array2::from_elem((4, 4), 1.0f32),
            GeoTransform::north_up(0.0, 4.0, 1.0, -1.0),
            4326,
        )
        .unwrap()
    }

    #[test]
    fn test_missing_hazard_file_names_rp_and_path() {
        let store = HazardStore::new(PathBuf::from("/nonexistent/hzd"));
        let err = store.resolve(100).unwrap_err();
        match err {
            AnalysisError::HazardUnavailable { rp, path } => {
                assert_eq!(rp, 100);
                assert!(path.to_string_lossy().contains("1in100.tif"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_discover_sorts_return_periods() {
        let dir = tempfile::tempdir().unwrap();
        for rp in [100u32, 10, 1000] {
            std::fs::write(dir.path().join(format!("1in{rp}.tif")), b"stub").unwrap();
        }
        std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();

        let store = HazardStore::new(dir.path().to_path_buf());
        assert_eq!(store.discover().unwrap(), vec![10, 100, 1000]);
    }

    #[test]
    fn test_load_aligned_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_grid();

        let hazard = Grid::new(
            Array2::from_elem((4, 4), 2.5f32),
            GeoTransform::north_up(0.0, 4.0, 1.0, -1.0),
            4326,
        )
        .unwrap();
        zonalgrid::geotiff::write(&dir.path().join("1in50.tif"), &hazard).unwrap();

        let store = HazardStore::new(dir.path().to_path_buf());
        let aligned = store.load_aligned(50, &target).unwrap();
        assert_eq!(aligned.rows(), 4);
        assert_eq!(aligned.data()[[2, 2]], 2.5);
    }

    #[test]
    fn test_corrupt_hazard_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1in10.tif"), b"not a tiff").unwrap();
        let store = HazardStore::new(dir.path().to_path_buf());
        let err = store.load_aligned(10, &target_grid()).unwrap_err();
        assert!(matches!(err, AnalysisError::HazardRead { rp: 10, .. }));
    }

    #[test]
    fn test_explicit_file_mapping_wins() {
        let dir = tempfile::tempdir().unwrap();
        let special = dir.path().join("depth_surge.tif");
        std::fs::write(&special, b"stub").unwrap();

        let store = HazardStore::new(dir.path().to_path_buf())
            .with_files(HashMap::from([(25, special.clone())]));
        assert_eq!(store.resolve(25).unwrap(), special);
    }
}
