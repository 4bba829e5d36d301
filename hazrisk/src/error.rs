//! Error taxonomy for a risk-screening run
//!
//! Configuration errors are raised before any raster I/O; data availability,
//! alignment and per-RP errors abort the run with no partial export.

use std::path::PathBuf;

use thiserror::Error;

use crate::vulnerability::expr::ExprError;

#[derive(Debug, Error)]
pub enum AnalysisError {
    // --- configuration (pre-run) ---
    #[error("class edges must be provided for Classes analysis")]
    MissingClassEdges,

    #[error("class edges are not strictly ascending: {0:?}")]
    NonAscendingClassEdges(Vec<f64>),

    #[error("unknown exposure category: {0} (expected POP, BU or AGR)")]
    UnknownExposureCategory(String),

    #[error("no {hazard} damage function available for exposure {exposure}")]
    NoDamageFunction { hazard: String, exposure: String },

    #[error("no code/name field mapping for administrative level {0}")]
    AdmFieldMapping(u8),

    #[error("scenario is required for period {0} (only the 2020 baseline runs without one)")]
    MissingScenario(String),

    #[error("at least one return period is required")]
    NoReturnPeriods,

    #[error("return period must be positive, got {0}")]
    ZeroReturnPeriod(u32),

    #[error("duplicate return period: {0}")]
    DuplicateReturnPeriod(u32),

    // --- data availability ---
    #[error("administrative boundaries not available for {country} level {level}: {origin}")]
    BoundariesUnavailable {
        country: String,
        level: u8,
        origin: String,
    },

    #[error("boundary layer {layer} yielded no zones")]
    EmptyZoneSet { layer: String },

    #[error("zone {index} is missing the {field} field required at level {level}")]
    ZoneFieldMissing {
        index: usize,
        field: String,
        level: u8,
    },

    #[error("exposure raster not found: {}", path.display())]
    ExposureUnavailable { path: PathBuf },

    #[error("hazard raster missing for RP {rp}: {}", path.display())]
    HazardUnavailable { rp: u32, path: PathBuf },

    #[error("failed to read hazard raster for RP {rp} ({}): {source}", path.display())]
    HazardRead {
        rp: u32,
        path: PathBuf,
        #[source]
        source: zonalgrid::GridError,
    },

    // --- alignment ---
    #[error("cannot align hazard grid (EPSG:{source_epsg}) to exposure grid (EPSG:{target_epsg}); build with the `reproject` feature for cross-CRS inputs")]
    Alignment { source_epsg: u32, target_epsg: u32 },

    // --- execution ---
    #[error("return period {rp} did not complete within {seconds}s")]
    Deadline { rp: u32, seconds: u64 },

    #[error("worker for return period {rp} failed: {reason}")]
    Worker { rp: u32, reason: String },

    #[error("export failed: {0}")]
    Export(String),

    // --- wrapped sources ---
    #[error(transparent)]
    Expression(#[from] ExprError),

    #[error(transparent)]
    Grid(#[from] zonalgrid::GridError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    /// True for errors that are detectable before any raster is opened.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingClassEdges
                | Self::NonAscendingClassEdges(_)
                | Self::UnknownExposureCategory(_)
                | Self::NoDamageFunction { .. }
                | Self::AdmFieldMapping(_)
                | Self::MissingScenario(_)
                | Self::NoReturnPeriods
                | Self::ZeroReturnPeriod(_)
                | Self::DuplicateReturnPeriod(_)
                | Self::Expression(_)
        )
    }
}
