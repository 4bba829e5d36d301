//! # hazrisk
//!
//! Probabilistic natural-hazard risk screening: for a country, a hazard
//! category and a set of return periods, estimate how much of an exposure
//! layer (population, built-up area, agriculture) is affected at each
//! return period, convert hazard intensity into impact fractions through a
//! vulnerability function, aggregate to administrative zones and derive
//! expected annual impact/exposure by integrating over return-period
//! exceedance probabilities.
//!
//! ## Features
//!
//! - Function mode (continuous damage curves) and Classes mode
//!   (cumulative severity bins)
//! - Lower-bound / upper-bound / mean annualization bracketing
//! - Parallel per-return-period processing with fail-fast semantics
//! - CSV, GeoPackage and GeoJSON export
//!
//! ## Usage
//!
//! ```bash
//! # Flood risk over population, Cambodia, ADM1
//! hazrisk --country KHM --hazard-cat FLUVIAL_UNDEFENDED \
//!         --rps 10,100,500 --exposure POP --adm-level 1 --min-threshold 0.5
//!
//! # Probability weights only
//! hazrisk weights --rps 10,100,500
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod export;
pub mod exposure;
pub mod hazard;
pub mod probability;
pub mod report;
pub mod vulnerability;
pub mod zones;

pub use analysis::{run_analysis, RunOutcome};
pub use config::{AnalysisMode, ExposureCategory, HazardKind, Paths, Region, RunConfig};
pub use error::AnalysisError;
pub use probability::{Method, ProbabilityModel};
pub use report::{RunReport, RunStatus};
