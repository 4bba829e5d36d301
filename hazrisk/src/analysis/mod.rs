//! Analysis orchestration
//!
//! One run walks through: validation, zone loading, exposure loading,
//! probability-weight derivation, the startup total-exposure zonal pass,
//! the parallel per-RP fan-out, assembly/annualization, and export. Any
//! failure aborts the run before anything is written; there is no
//! partial-success export.

pub mod assemble;
pub mod rp;
pub mod table;

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{info, warn};

use crate::config::{AnalysisMode, BoundarySource, Paths, Region, RunConfig};
use crate::error::AnalysisError;
use crate::export::{geojson, gpkg, table_csv};
use crate::hazard::HazardStore;
use crate::probability::ProbabilityModel;
use crate::report::{RpStats, RunReport, RunStatus};
use crate::vulnerability::{self, CustomFunction, FunctionRegistry};
use crate::zones::ZoneSet;
use crate::{exposure, zones};
use self::table::{MetricKind, ResultTable, RpPartial};
use zonalgrid::ClassBins;

/// Result of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    pub table: ResultTable,
    pub report: RunReport,
}

/// Per-RP line of the country-total summary printed after Function-mode
/// runs: exceedance frequency band and EAI contribution.
#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub rp: u32,
    pub frequency: f64,
    pub impact_total: f64,
    pub exceedance_band: f64,
    pub eai_contribution: f64,
}

/// Run the full analysis and export its artifacts.
pub async fn run_analysis(paths: &Paths, cfg: RunConfig) -> Result<RunOutcome, AnalysisError> {
    let run_started = Instant::now();
    let mut report = RunReport::new(
        &cfg.country,
        &cfg.hazard_category,
        cfg.exposure.code(),
        cfg.admin_level,
        &cfg.mode.to_string(),
        &cfg.return_periods,
    );

    // --- Validating ---
    let phase_started = Instant::now();
    cfg.validate()?;
    let registry = FunctionRegistry::with_builtins();
    if cfg.mode == AnalysisMode::Function {
        match &cfg.custom_expression {
            // Parse now so a malformed expression fails before any I/O.
            Some(source) => {
                let _ = CustomFunction::parse(source)?;
            }
            None => {
                let _ = registry.resolve(cfg.hazard_kind, cfg.exposure, Region::Global)?;
            }
        }
    }
    report.record_phase("Validating", phase_started.elapsed().as_secs_f64());

    // --- LoadingZones ---
    let phase_started = Instant::now();
    let zone_set = load_zones(paths, &cfg, &mut report).await?;
    let region = Region::from_wb_code(zone_set.wb_region.as_deref().unwrap_or("Other"));
    report.zones = zone_set.len();
    info!(zones = zone_set.len(), ?region, "administrative zones loaded");
    report.record_phase("LoadingZones", phase_started.elapsed().as_secs_f64());

    // --- LoadingExposure ---
    let phase_started = Instant::now();
    let exposure_path = exposure::resolve_path(paths, &cfg);
    let exposure_grid = Arc::new(exposure::load(paths, &cfg)?);
    report.grid_rows = exposure_grid.rows();
    report.grid_cols = exposure_grid.cols();
    report.record_input("exposure", &exposure_path);

    // Resolve every hazard raster up front: the exported result represents
    // all requested RPs or none, so a missing file should fail before any
    // work is done.
    let store = HazardStore::new(paths.hazard_dir(&cfg));
    for &rp in &cfg.return_periods {
        let path = store.resolve(rp)?;
        report.record_input(&format!("hazard_rp{rp}"), &path);
    }
    report.record_phase("LoadingExposure", phase_started.elapsed().as_secs_f64());

    // --- ComputingProbabilityWeights ---
    let phase_started = Instant::now();
    let model = ProbabilityModel::from_return_periods(&cfg.return_periods)?;
    report.record_phase("ComputingProbabilityWeights", phase_started.elapsed().as_secs_f64());

    // --- Startup zonal pass: total exposure per zone ---
    let phase_started = Instant::now();
    let geometries = Arc::new(zone_set.geometries());
    let total_exposure = {
        let geometries = Arc::clone(&geometries);
        let exposure_grid = Arc::clone(&exposure_grid);
        let jobs = cfg.worker_count();
        tokio::task::spawn_blocking(move || {
            rp::total_exposure_per_zone(&geometries, &exposure_grid, jobs)
        })
        .await
        .map_err(|e| AnalysisError::Worker {
            rp: 0,
            reason: format!("total-exposure task failed: {e}"),
        })??
    };
    report.record_phase("TotalExposure", phase_started.elapsed().as_secs_f64());

    // --- ProcessingReturnPeriods ---
    let phase_started = Instant::now();
    let context = Arc::new(build_context(&cfg, paths, store, exposure_grid, geometries, &registry, region)?);
    let jobs = cfg.worker_count();
    info!(jobs, rps = cfg.return_periods.len(), "processing return periods");

    let deadline = cfg.rp_deadline;
    let results: Vec<(RpPartial, f64)> = stream::iter(cfg.return_periods.clone())
        .map(|rp| {
            let context = Arc::clone(&context);
            async move {
                let started = Instant::now();
                match tokio::time::timeout(
                    deadline,
                    tokio::task::spawn_blocking(move || rp::process_return_period(rp, &context)),
                )
                .await
                {
                    Err(_) => Err(AnalysisError::Deadline {
                        rp,
                        seconds: deadline.as_secs(),
                    }),
                    Ok(Err(join_error)) => Err(AnalysisError::Worker {
                        rp,
                        reason: join_error.to_string(),
                    }),
                    Ok(Ok(Err(e))) => Err(e),
                    Ok(Ok(Ok(partial))) => Ok((partial, started.elapsed().as_secs_f64())),
                }
            }
        })
        .buffered(jobs)
        .try_collect()
        .await?;

    for (partial, seconds) in &results {
        report.rp_stats.push(RpStats {
            rp: partial.rp,
            affected_cells: partial.affected_cells,
            seconds: *seconds,
        });
    }
    let partials: Vec<RpPartial> = results.into_iter().map(|(partial, _)| partial).collect();
    report.record_phase("ProcessingReturnPeriods", phase_started.elapsed().as_secs_f64());

    // --- Assembling + Annualizing ---
    let phase_started = Instant::now();
    let table = assemble::assemble(&cfg, &zone_set, total_exposure, partials, &model)?;
    report.record_phase("Assembling", phase_started.elapsed().as_secs_f64());

    // --- Exporting ---
    let phase_started = Instant::now();
    export_artifacts(paths, &cfg, &table, &zone_set, &model, &mut report).await?;
    report.record_phase("Exporting", phase_started.elapsed().as_secs_f64());

    report.status = RunStatus::Success;
    report.duration_secs = run_started.elapsed().as_secs_f64();
    let report_path = paths.output_dir.join(format!("{}_report.json", cfg.file_prefix()));
    report
        .write_json(&report_path)
        .map_err(|e| AnalysisError::Export(e.to_string()))?;

    Ok(RunOutcome { table, report })
}

async fn load_zones(
    paths: &Paths,
    cfg: &RunConfig,
    report: &mut RunReport,
) -> Result<ZoneSet, AnalysisError> {
    match &cfg.boundaries {
        BoundarySource::CountryGeopackage => {
            let path = paths.boundaries_gpkg(&cfg.country);
            let zone_set = zones::from_geopackage(&path, &cfg.country, cfg.admin_level).await?;
            report.record_input("boundaries", &path);
            Ok(zone_set)
        }
        BoundarySource::File {
            path,
            code_field,
            name_field,
        } => {
            let zone_set = zones::from_geojson(path, code_field, name_field, cfg.admin_level)?;
            report.record_input("boundaries", path);
            Ok(zone_set)
        }
    }
}

fn build_context(
    cfg: &RunConfig,
    paths: &Paths,
    store: HazardStore,
    exposure_grid: Arc<zonalgrid::Grid<f32>>,
    geometries: Arc<Vec<geo::MultiPolygon>>,
    registry: &FunctionRegistry,
    region: Region,
) -> Result<rp::RpContext, AnalysisError> {
    let vulnerability = match cfg.mode {
        AnalysisMode::Function => {
            let function = vulnerability::resolve_for_run(cfg, registry, region)?;
            info!(function = function.name(), "impact function resolved");
            Some(Arc::from(function))
        }
        AnalysisMode::Classes => None,
    };
    let bins = match cfg.mode {
        AnalysisMode::Classes => Some(
            ClassBins::new(cfg.class_edges.clone())
                .map_err(|_| AnalysisError::NonAscendingClassEdges(cfg.class_edges.clone()))?,
        ),
        AnalysisMode::Function => None,
    };
    Ok(rp::RpContext {
        cfg: cfg.clone(),
        store,
        exposure: exposure_grid,
        zones: geometries,
        vulnerability,
        bins,
        output_dir: paths.output_dir.clone(),
    })
}

async fn export_artifacts(
    paths: &Paths,
    cfg: &RunConfig,
    table: &ResultTable,
    zone_set: &ZoneSet,
    model: &ProbabilityModel,
    report: &mut RunReport,
) -> Result<(), AnalysisError> {
    let prefix = cfg.file_prefix();

    let prob_path = paths
        .output_dir
        .join(format!("{}_{}_prob_RPs.csv", cfg.country, cfg.hazard_category));
    model.write_csv(&prob_path)?;
    report.outputs.push(prob_path);

    let csv_path = paths.output_dir.join(format!("{prefix}_results.csv"));
    table_csv::write_csv(table, &csv_path)?;
    report.outputs.push(csv_path);

    let gpkg_path = paths.output_dir.join(format!("{prefix}_results.gpkg"));
    gpkg::write_gpkg(table, zone_set, &gpkg_path, &cfg.layer_name()).await?;
    report.outputs.push(gpkg_path);

    if cfg.export_geojson {
        let geojson_path = paths.output_dir.join(format!("{prefix}_results.geojson"));
        geojson::write_geojson(table, zone_set, &geojson_path)?;
        report.outputs.push(geojson_path);
    }
    Ok(())
}

/// Country-total impact per RP with its exceedance band (the lower-bound
/// weight) and EAI contribution. Function mode only.
pub fn summarize(table: &ResultTable, model: &ProbabilityModel) -> Vec<SummaryRow> {
    let mut rows = Vec::new();
    for column in &table.metrics {
        if column.kind != MetricKind::ImpactedExposure {
            continue;
        }
        let Some(weights) = model.get(column.rp) else {
            warn!(rp = column.rp, "no probability entry for summary row");
            continue;
        };
        let impact_total: f64 = column.values.iter().sum();
        rows.push(SummaryRow {
            rp: column.rp,
            frequency: weights.probability,
            impact_total,
            exceedance_band: weights.lower,
            eai_contribution: impact_total * weights.lower,
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::table::{MetricColumn, ZoneLabels};
    use crate::config::ExposureCategory;

    #[test]
    fn test_summarize_uses_lower_bound_band() {
        let model = ProbabilityModel::from_return_periods(&[10, 50]).unwrap();
        let table = ResultTable {
            exposure: ExposureCategory::Population,
            admin_level: 1,
            labels: ZoneLabels {
                code_fields: vec![],
                name_fields: vec![],
                codes: vec![],
                names: vec![],
            },
            total_exposure: vec![1000.0, 500.0],
            metrics: vec![
                MetricColumn {
                    rp: 10,
                    kind: MetricKind::ImpactedExposure,
                    values: vec![60.0, 40.0],
                },
                MetricColumn {
                    rp: 50,
                    kind: MetricKind::ImpactedExposure,
                    values: vec![300.0, 100.0],
                },
            ],
            annual: vec![],
            single_rp: false,
        };

        let rows = summarize(&table, &model);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].rp, 10);
        assert_eq!(rows[0].impact_total, 100.0);
        assert!((rows[0].exceedance_band - 0.08).abs() < 1e-12);
        assert!((rows[0].eai_contribution - 8.0).abs() < 1e-12);
        assert_eq!(rows[1].rp, 50);
        assert!((rows[1].eai_contribution - 400.0 * 0.02).abs() < 1e-12);
    }
}
