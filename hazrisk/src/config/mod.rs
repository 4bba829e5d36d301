//! Run configuration
//!
//! All run state lives in an explicit [`RunConfig`] handed to the
//! orchestrator; nothing is process-global. Directory locations come from
//! the environment (`.env` supported), mirroring the deployment layout:
//! `DATA_DIR/HZD/...` for hazard stacks, `DATA_DIR/EXP` for exposure
//! rasters, `DATA_DIR/ADM` for boundaries, `OUTPUT_DIR` for artifacts.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use zonalgrid::ZonalStat;

use crate::error::AnalysisError;

/// Data/output/cache roots resolved from the environment.
#[derive(Debug, Clone)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Paths {
    /// Read `DATA_DIR`, `OUTPUT_DIR` and `CACHE_DIR`, with conventional
    /// fallbacks, and make sure the writable directories exist.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str, default: &str| {
            std::env::var(name)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(default))
        };
        let paths = Self {
            data_dir: var("DATA_DIR", "./data"),
            output_dir: var("OUTPUT_DIR", "./output"),
            cache_dir: var("CACHE_DIR", "./cache"),
        };
        std::fs::create_dir_all(&paths.output_dir)
            .with_context(|| format!("Failed to create output dir {}", paths.output_dir.display()))?;
        std::fs::create_dir_all(&paths.cache_dir)
            .with_context(|| format!("Failed to create cache dir {}", paths.cache_dir.display()))?;
        Ok(paths)
    }

    pub fn hazard_dir(&self, cfg: &RunConfig) -> PathBuf {
        let mut dir = self.data_dir.join("HZD");
        if cfg.hazard_kind == HazardKind::Custom {
            dir = dir.join("CUSTOM").join(&cfg.hazard_category);
        } else {
            dir = dir
                .join(&cfg.country)
                .join(&cfg.hazard_category)
                .join(&cfg.period);
            if let Some(scenario) = &cfg.scenario {
                dir = dir.join(scenario);
            }
        }
        dir
    }

    pub fn exposure_dir(&self) -> PathBuf {
        self.data_dir.join("EXP")
    }

    pub fn boundaries_gpkg(&self, country: &str) -> PathBuf {
        self.data_dir.join("ADM").join(format!("{country}_ADM.gpkg"))
    }
}

/// Code/name attribute fields for one administrative level.
///
/// Levels follow the World Bank global administrative divisions layout:
/// `HASC_n` codes and `NAM_n` names, levels 0 (country) through 2.
pub fn adm_field_names(level: u8) -> Result<(String, String), AnalysisError> {
    if level > 2 {
        return Err(AnalysisError::AdmFieldMapping(level));
    }
    Ok((format!("HASC_{level}"), format!("NAM_{level}")))
}

/// Damage-curve region groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Africa,
    Asia,
    Lac,
    Global,
}

impl Region {
    /// Map a World Bank region code onto a curve group. Unknown codes use
    /// the global curves.
    pub fn from_wb_code(code: &str) -> Self {
        match code {
            "AFR" | "MENA" => Self::Africa,
            "EAP" | "SAR" | "ECA" => Self::Asia,
            "LCR" => Self::Lac,
            _ => Self::Global,
        }
    }
}

/// Exposure layer categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExposureCategory {
    Population,
    BuiltUp,
    Agriculture,
}

impl ExposureCategory {
    /// Short code used in file names and result columns.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Population => "POP",
            Self::BuiltUp => "BU",
            Self::Agriculture => "AGR",
        }
    }
}

impl FromStr for ExposureCategory {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "POP" => Ok(Self::Population),
            "BU" => Ok(Self::BuiltUp),
            "AGR" => Ok(Self::Agriculture),
            other => Err(AnalysisError::UnknownExposureCategory(other.to_string())),
        }
    }
}

impl fmt::Display for ExposureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Hazard families with built-in damage-function sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HazardKind {
    Flood,
    TropicalCyclone,
    Custom,
}

impl HazardKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Flood => "FL",
            Self::TropicalCyclone => "TC",
            Self::Custom => "CUSTOM",
        }
    }
}

impl FromStr for HazardKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FL" | "FLOOD" => Ok(Self::Flood),
            "TC" | "CYCLONE" => Ok(Self::TropicalCyclone),
            "CUSTOM" => Ok(Self::Custom),
            other => Err(format!("unknown hazard type: {other} (expected FL, TC or CUSTOM)")),
        }
    }
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Aggregation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Continuous damage function: affected and impacted exposure per RP.
    Function,
    /// Discrete severity classes with cumulative binning.
    Classes,
}

impl FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "function" => Ok(Self::Function),
            "classes" => Ok(Self::Classes),
            other => Err(format!("unknown analysis mode: {other} (expected function or classes)")),
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function => f.write_str("Function"),
            Self::Classes => f.write_str("Classes"),
        }
    }
}

/// Where the zone polygons come from.
#[derive(Debug, Clone)]
pub enum BoundarySource {
    /// `{DATA_DIR}/ADM/{COUNTRY}_ADM.gpkg`, layer `ADM{level}`.
    CountryGeopackage,
    /// User-supplied GeoJSON with explicit code/name fields.
    File {
        path: PathBuf,
        code_field: String,
        name_field: String,
    },
}

/// Full configuration of one analysis run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub country: String,
    pub hazard_kind: HazardKind,
    pub hazard_category: String,
    pub period: String,
    pub scenario: Option<String>,
    pub return_periods: Vec<u32>,
    pub min_hazard_threshold: f64,
    pub exposure: ExposureCategory,
    pub exposure_name: Option<String>,
    pub exposure_year: String,
    pub admin_level: u8,
    pub mode: AnalysisMode,
    pub class_edges: Vec<f64>,
    pub custom_expression: Option<String>,
    pub zonal_stat: ZonalStat,
    pub boundaries: BoundarySource,
    pub save_intermediate: bool,
    pub export_geojson: bool,
    pub jobs: Option<usize>,
    pub rp_deadline: Duration,
}

/// Historical baseline period that runs without a climate scenario.
pub const BASELINE_PERIOD: &str = "2020";

impl RunConfig {
    /// Pre-run validation: everything here is checkable before any raster
    /// or boundary file is opened.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.mode == AnalysisMode::Classes {
            if self.class_edges.is_empty() {
                return Err(AnalysisError::MissingClassEdges);
            }
            if self.class_edges.windows(2).any(|w| w[0] >= w[1]) {
                return Err(AnalysisError::NonAscendingClassEdges(self.class_edges.clone()));
            }
        }
        if self.period != BASELINE_PERIOD
            && self.scenario.is_none()
            && self.hazard_kind != HazardKind::Custom
        {
            return Err(AnalysisError::MissingScenario(self.period.clone()));
        }
        if matches!(self.boundaries, BoundarySource::CountryGeopackage) {
            adm_field_names(self.admin_level)?;
        }
        Ok(())
    }

    /// Worker-pool size: `min(#RPs, cores)` unless overridden.
    pub fn worker_count(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        self.jobs
            .unwrap_or_else(|| self.return_periods.len().min(cores))
            .max(1)
    }

    /// Common prefix of every output artifact of this run. The scenario tag
    /// is omitted for the 2020 baseline.
    pub fn file_prefix(&self) -> String {
        let base = format!(
            "{}_ADM{}_{}_{}_{}",
            self.country,
            self.admin_level,
            self.hazard_category,
            self.exposure.code(),
            self.period
        );
        match (&self.scenario, self.period.as_str()) {
            (Some(s), p) if p != BASELINE_PERIOD => format!("{base}_{s}"),
            _ => base,
        }
    }

    /// GeoPackage layer name, e.g. `POP_EAI_function` (`EAI`/`EAE` tag
    /// only for probabilistic multi-RP runs).
    pub fn layer_name(&self) -> String {
        let multi = self.return_periods.len() > 1;
        match self.mode {
            AnalysisMode::Function => {
                format!("{}_{}function", self.exposure.code(), if multi { "EAI_" } else { "" })
            }
            AnalysisMode::Classes => {
                format!("{}_{}class", self.exposure.code(), if multi { "EAE_" } else { "" })
            }
        }
    }
}
