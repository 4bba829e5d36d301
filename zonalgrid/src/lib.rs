//! # zonalgrid
//!
//! Georeferenced 2-D grids and the raster primitives needed by
//! hazard-exposure analysis.
//!
//! ## Features
//!
//! - `Grid<T>` backed by `ndarray` with an affine [`GeoTransform`]
//! - Single-band GeoTIFF reading/writing (georeference tags parsed directly)
//! - Nearest-neighbour alignment of a grid onto a target gridding
//! - Zonal statistics (sum/mean/max) over polygon sets, all-touched rule
//! - Ascending-edge classification binning with a missing-cell sentinel
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zonalgrid::{geotiff, zonal::{zonal_stats, ZonalStat}};
//!
//! let grid = geotiff::read(Path::new("exposure.tif"))?;
//! let sums = zonal_stats(&zones, &grid, ZonalStat::Sum, true)?;
//! ```

pub mod binning;
pub mod error;
pub mod geotiff;
pub mod grid;
pub mod resample;
pub mod transform;
pub mod zonal;

pub use binning::ClassBins;
pub use error::GridError;
pub use grid::Grid;
pub use transform::GeoTransform;
pub use zonal::{zonal_stats, ZonalStat};
