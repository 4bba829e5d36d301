//! Per-return-period processing
//!
//! Each return period is one independent unit of work: load and align the
//! RP's hazard grid, threshold it, derive impact (Function mode) or class
//! membership (Classes mode), and aggregate per zone. Workers share the
//! exposure grid and zone geometries read-only and mutate nothing.

use std::path::PathBuf;
use std::sync::Arc;

use geo::MultiPolygon;
use tracing::{debug, info};
use zonalgrid::binning::{class_indicator, ClassBins};
use zonalgrid::zonal::zonal_stats;
use zonalgrid::{geotiff, Grid, ZonalStat};

use crate::analysis::table::{MetricColumn, MetricKind, RpPartial};
use crate::config::{AnalysisMode, RunConfig};
use crate::error::AnalysisError;
use crate::hazard::HazardStore;
use crate::vulnerability::VulnerabilityFn;

/// Read-only state shared by every RP worker.
pub struct RpContext {
    pub cfg: RunConfig,
    pub store: HazardStore,
    pub exposure: Arc<Grid<f32>>,
    pub zones: Arc<Vec<MultiPolygon>>,
    /// Impact function (Function mode only).
    pub vulnerability: Option<Arc<dyn VulnerabilityFn>>,
    /// Validated class edges (Classes mode only).
    pub bins: Option<ClassBins>,
    pub output_dir: PathBuf,
}

impl RpContext {
    fn intermediate_path(&self, rp: u32, suffix: &str) -> PathBuf {
        let cfg = &self.cfg;
        let scenario = cfg.scenario.as_deref().unwrap_or("baseline");
        self.output_dir.join(format!(
            "{}_{}_{}_{}_{}_{}_{}.tif",
            cfg.country,
            cfg.hazard_category,
            cfg.period,
            scenario,
            rp,
            cfg.exposure.code(),
            suffix
        ))
    }
}

/// Process one return period into a zone-aligned partial result.
pub fn process_return_period(rp: u32, ctx: &RpContext) -> Result<RpPartial, AnalysisError> {
    let mut hazard = ctx.store.load_aligned(rp, &ctx.exposure)?;
    hazard.mask_at_or_below(ctx.cfg.min_hazard_threshold as f32);
    let affected_cells = hazard.valid_cells();
    debug!(rp, affected_cells, "hazard grid thresholded");

    let columns = match ctx.cfg.mode {
        AnalysisMode::Function => function_mode(rp, ctx, &hazard)?,
        AnalysisMode::Classes => classes_mode(rp, ctx, &hazard)?,
    };

    info!(rp, columns = columns.len(), "return period processed");
    Ok(RpPartial {
        rp,
        columns,
        affected_cells,
    })
}

fn function_mode(
    rp: u32,
    ctx: &RpContext,
    hazard: &Grid<f32>,
) -> Result<Vec<MetricColumn>, AnalysisError> {
    let vulnerability = ctx
        .vulnerability
        .as_ref()
        .unwrap_or_else(|| unreachable!("Function mode always resolves an impact function"));

    // Impact fraction per cell (F_i).
    let factor = vulnerability.apply(hazard);
    if ctx.cfg.save_intermediate {
        geotiff::write(&ctx.intermediate_path(rp, "haz_imp_factor"), &factor)?;
    }

    // Exposure restricted to the hazard footprint.
    let affected = ctx.exposure.where_positive(hazard)?;
    if ctx.cfg.save_intermediate {
        geotiff::write(&ctx.intermediate_path(rp, "affected"), &affected)?;
    }

    let affected_per_zone = sums(&affected, ctx)?;
    let impacted = affected.multiply(&factor)?;
    if ctx.cfg.save_intermediate {
        geotiff::write(&ctx.intermediate_path(rp, "impact"), &impacted)?;
    }
    let impacted_per_zone = sums(&impacted, ctx)?;

    Ok(vec![
        MetricColumn {
            rp,
            kind: MetricKind::AffectedExposure,
            values: affected_per_zone,
        },
        MetricColumn {
            rp,
            kind: MetricKind::ImpactedExposure,
            values: impacted_per_zone,
        },
    ])
}

fn classes_mode(
    rp: u32,
    ctx: &RpContext,
    hazard: &Grid<f32>,
) -> Result<Vec<MetricColumn>, AnalysisError> {
    let bins = ctx
        .bins
        .as_ref()
        .unwrap_or_else(|| unreachable!("Classes mode always carries validated edges"));

    let index = bins.bin_grid(hazard);
    let affected = ctx.exposure.where_positive(hazard)?;

    // Cumulative from the top bin down: each class k adds the already
    // accumulated k+1 total, so "class k" reads as "at least class k".
    let mut columns: Vec<MetricColumn> = Vec::with_capacity(bins.num_bins());
    let mut cumulative: Option<Vec<f64>> = None;
    for k in (0..bins.num_bins()).rev() {
        let masked = affected.multiply(&class_indicator(&index, k))?;
        let mut values = sums(&masked, ctx)?;
        if let Some(higher) = &cumulative {
            for (v, h) in values.iter_mut().zip(higher) {
                *v += h;
            }
        }
        cumulative = Some(values.clone());
        columns.push(MetricColumn {
            rp,
            kind: MetricKind::ClassExposure(k),
            values,
        });
    }
    Ok(columns)
}

/// Zonal aggregation with the run's statistic; zones covering no valid cell
/// contribute zero.
fn sums(grid: &Grid<f32>, ctx: &RpContext) -> Result<Vec<f64>, AnalysisError> {
    let stats = zonal_stats(&ctx.zones, grid, ctx.cfg.zonal_stat, true)?;
    Ok(stats.into_iter().map(|v| v.unwrap_or(0.0)).collect())
}

/// Startup pass: total exposure per zone, always a sum over the raw
/// (unmasked) exposure grid. Chunked across the worker pool with rayon;
/// completes before the RP pool starts.
pub fn total_exposure_per_zone(
    zones: &[MultiPolygon],
    exposure: &Grid<f32>,
    jobs: usize,
) -> Result<Vec<f64>, AnalysisError> {
    use rayon::prelude::*;

    let chunk_size = zones.len().div_ceil(jobs.max(1)).max(1);
    let chunks: Vec<Vec<Option<f64>>> = zones
        .par_chunks(chunk_size)
        .map(|chunk| zonal_stats(chunk, exposure, ZonalStat::Sum, true))
        .collect::<Result<_, _>>()?;
    Ok(chunks
        .into_iter()
        .flatten()
        .map(|v| v.unwrap_or(0.0))
        .collect())
}
