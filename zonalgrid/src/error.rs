//! Error types for the zonalgrid crate

use thiserror::Error;

/// Errors raised while reading, aligning or aggregating grids
#[derive(Debug, Error)]
pub enum GridError {
    /// I/O error while reading or writing a raster file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The TIFF container could not be decoded
    #[error("TIFF error in {file}: {reason}")]
    Tiff { file: String, reason: String },

    /// The raster carries no usable georeferencing tags
    #[error("Missing georeference (ModelPixelScale/ModelTiepoint or ModelTransformation) in {0}")]
    MissingGeoreference(String),

    /// Sample format not representable as f32 cell values
    #[error("Unsupported sample format in {file}: {format}")]
    UnsupportedSampleFormat { file: String, format: String },

    /// Grid dimensions do not match the expected shape
    #[error("Shape mismatch: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    ShapeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    /// Source and target grids live in different coordinate reference systems
    #[error("CRS mismatch: source EPSG:{source_epsg} vs target EPSG:{target}")]
    CrsMismatch { source_epsg: u32, target: u32 },

    /// A rotated/sheared transform that the scanline rasterizer cannot handle
    #[error("Unsupported geotransform (rotation/shear terms are non-zero)")]
    RotatedTransform,

    /// Zero-sized grid
    #[error("Grid has zero rows or columns")]
    EmptyGrid,

    /// Classification edges are not strictly ascending
    #[error("Class edges are not strictly ascending: {0:?}")]
    NonAscendingEdges(Vec<f64>),
}

impl GridError {
    /// TIFF decode error with file context
    pub fn tiff(file: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Tiff {
            file: file.into(),
            reason: reason.to_string(),
        }
    }
}
