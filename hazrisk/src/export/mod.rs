//! Output artifacts: CSV (flat), GeoPackage (geometry-bearing) and an
//! optional GeoJSON rendition of the result table.
//!
//! Every writer targets a sibling `.partial` path and renames into place,
//! so a failed export never leaves a half-written artifact behind.

pub mod geojson;
pub mod gpkg;
pub mod table_csv;

use std::path::{Path, PathBuf};

/// Temp path the writers stage into before the final rename.
pub(crate) fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
