//! Result assembly and annualization
//!
//! Partial results are concatenated in the run's RP-list order (the same
//! order the probability weights were derived in), reordered for
//! presentation, annualized per method, and rounded. Annualization is an
//! explicit branch: single-RP runs report raw per-RP values and produce no
//! expected-annual columns at all.

use tracing::debug;

use crate::analysis::table::{
    AnnualColumn, AnnualKind, MetricColumn, MetricKind, ResultTable, RpPartial, ZoneLabels,
};
use crate::config::{AnalysisMode, RunConfig};
use crate::error::AnalysisError;
use crate::probability::{Method, ProbabilityModel};
use crate::zones::ZoneSet;

/// Assemble per-RP partials into the final table.
pub fn assemble(
    cfg: &RunConfig,
    zones: &ZoneSet,
    total_exposure: Vec<f64>,
    mut partials: Vec<RpPartial>,
    model: &ProbabilityModel,
) -> Result<ResultTable, AnalysisError> {
    // Column concatenation is order-sensitive: restore the RP-list order
    // regardless of worker completion order.
    let rp_index = |rp: u32| {
        cfg.return_periods
            .iter()
            .position(|&r| r == rp)
            .unwrap_or(usize::MAX)
    };
    partials.sort_by_key(|p| rp_index(p.rp));

    let metrics = ordered_metrics(cfg, partials);
    let single_rp = cfg.return_periods.len() == 1;

    let mut table = ResultTable {
        exposure: cfg.exposure,
        admin_level: cfg.admin_level,
        labels: ZoneLabels::from_zone_set(zones),
        total_exposure,
        metrics,
        annual: Vec::new(),
        single_rp,
    };

    if single_rp {
        debug!("single return period: skipping annualization");
    } else {
        for method in Method::ALL {
            annualize(&mut table, cfg, model, method);
        }
    }

    round_table(&mut table);
    Ok(table)
}

/// Presentation order of the per-RP columns. Function mode groups all
/// affected-exposure columns before all impacted-exposure columns (each
/// group in RP order); Classes mode keeps per-RP blocks, highest class
/// first within each block.
fn ordered_metrics(cfg: &RunConfig, partials: Vec<RpPartial>) -> Vec<MetricColumn> {
    match cfg.mode {
        AnalysisMode::Function => {
            let mut affected = Vec::new();
            let mut impacted = Vec::new();
            for partial in partials {
                for column in partial.columns {
                    match column.kind {
                        MetricKind::AffectedExposure => affected.push(column),
                        MetricKind::ImpactedExposure => impacted.push(column),
                        MetricKind::ClassExposure(_) => {}
                    }
                }
            }
            affected.extend(impacted);
            affected
        }
        AnalysisMode::Classes => partials.into_iter().flat_map(|p| p.columns).collect(),
    }
}

/// Weight every selected RP column by the method's exceedance weight and
/// sum across return periods.
fn weighted_sum(
    metrics: &[MetricColumn],
    rows: usize,
    model: &ProbabilityModel,
    method: Method,
    select: impl Fn(&MetricColumn) -> bool,
) -> Vec<f64> {
    let mut acc = vec![0.0f64; rows];
    for column in metrics {
        if !select(column) {
            continue;
        }
        let Some(weights) = model.get(column.rp) else {
            continue;
        };
        let w = method.weight(weights);
        for (a, v) in acc.iter_mut().zip(&column.values) {
            *a += v * w;
        }
    }
    acc
}

fn percent_of_total(values: &[f64], total: &[f64]) -> Vec<f64> {
    values
        .iter()
        .zip(total)
        .map(|(v, t)| if *t > 0.0 { 100.0 * v / t } else { 0.0 })
        .collect()
}

/// One method's expected-annual columns: weight every RP column, sum across
/// RPs, derive the percent-of-total column.
fn annualize(table: &mut ResultTable, cfg: &RunConfig, model: &ProbabilityModel, method: Method) {
    let rows = table.num_rows();

    match cfg.mode {
        AnalysisMode::Function => {
            let eai = weighted_sum(&table.metrics, rows, model, method, |c| {
                c.kind == MetricKind::ImpactedExposure
            });
            let pct = percent_of_total(&eai, &table.total_exposure);
            table.annual.push(AnnualColumn {
                kind: AnnualKind::Eai,
                method,
                percent: false,
                values: eai,
            });
            table.annual.push(AnnualColumn {
                kind: AnnualKind::Eai,
                method,
                percent: true,
                values: pct,
            });
        }
        AnalysisMode::Classes => {
            let num_bins = cfg.class_edges.len() + 1;
            let mut eae_cols = Vec::with_capacity(num_bins);
            for k in (0..num_bins).rev() {
                let eae = weighted_sum(&table.metrics, rows, model, method, |c| {
                    c.kind == MetricKind::ClassExposure(k)
                });
                eae_cols.push((k, eae));
            }
            for (k, eae) in &eae_cols {
                table.annual.push(AnnualColumn {
                    kind: AnnualKind::ClassEae(*k),
                    method,
                    percent: false,
                    values: eae.clone(),
                });
            }
            for (k, eae) in &eae_cols {
                table.annual.push(AnnualColumn {
                    kind: AnnualKind::ClassEae(*k),
                    method,
                    percent: true,
                    values: percent_of_total(eae, &table.total_exposure),
                });
            }
        }
    }
}

/// Round every value to three decimals; higher precision would only
/// suggest accuracy the inputs do not have.
fn round_table(table: &mut ResultTable) {
    let round3 = |v: &mut f64| *v = (*v * 1000.0).round() / 1000.0;
    table.total_exposure.iter_mut().for_each(round3);
    for column in &mut table.metrics {
        column.values.iter_mut().for_each(round3);
    }
    for column in &mut table.annual {
        column.values.iter_mut().for_each(round3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoundarySource, ExposureCategory, HazardKind};
    use crate::zones::{Zone, ZoneSet};
    use geo::{polygon, MultiPolygon};
    use std::time::Duration;
    use zonalgrid::ZonalStat;

    fn one_zone_set() -> ZoneSet {
        ZoneSet {
            level: 1,
            code_fields: vec!["HASC_1".to_string()],
            name_fields: vec!["NAM_1".to_string()],
            zones: vec![Zone {
                codes: vec!["KH.A".to_string()],
                names: vec!["Alpha".to_string()],
                geometry: MultiPolygon(vec![polygon![
                    (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0),
                ]]),
            }],
            epsg: 4326,
            wb_region: None,
        }
    }

    fn config(rps: Vec<u32>, mode: AnalysisMode, edges: Vec<f64>) -> RunConfig {
        RunConfig {
            country: "TST".to_string(),
            hazard_kind: HazardKind::Flood,
            hazard_category: "FLUVIAL_UNDEFENDED".to_string(),
            period: "2020".to_string(),
            scenario: None,
            return_periods: rps,
            min_hazard_threshold: 0.5,
            exposure: ExposureCategory::Population,
            exposure_name: None,
            exposure_year: "2020".to_string(),
            admin_level: 1,
            mode,
            class_edges: edges,
            custom_expression: None,
            zonal_stat: ZonalStat::Sum,
            boundaries: BoundarySource::CountryGeopackage,
            save_intermediate: false,
            export_geojson: false,
            jobs: None,
            rp_deadline: Duration::from_secs(600),
        }
    }

    fn partial(rp: u32, affected: f64, impacted: f64) -> RpPartial {
        RpPartial {
            rp,
            columns: vec![
                MetricColumn {
                    rp,
                    kind: MetricKind::AffectedExposure,
                    values: vec![affected],
                },
                MetricColumn {
                    rp,
                    kind: MetricKind::ImpactedExposure,
                    values: vec![impacted],
                },
            ],
            affected_cells: 0,
        }
    }

    /// The worked scenario: RPs [10, 50], one zone with total exposure 1000,
    /// impacted {RP10: 100, RP50: 400}. Mean weights are 0.04 and 0.05, so
    /// EAI_Mean = 100*0.04 + 400*0.05 = 24 and EAI% = 2.4.
    #[test]
    fn test_two_rp_scenario_matches_hand_computation() {
        let cfg = config(vec![10, 50], AnalysisMode::Function, vec![]);
        let model = ProbabilityModel::from_return_periods(&cfg.return_periods).unwrap();
        let partials = vec![partial(10, 500.0, 100.0), partial(50, 800.0, 400.0)];

        let table = assemble(&cfg, &one_zone_set(), vec![1000.0], partials, &model).unwrap();
        assert!(!table.single_rp);

        let names: Vec<String> = table
            .value_columns()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        assert_eq!(
            names,
            vec![
                "ADM1_POP",
                "RP10_POP_exp",
                "RP50_POP_exp",
                "RP10_POP_imp",
                "RP50_POP_imp",
                "POP_EAI_LB",
                "POP_EAI%_LB",
                "POP_EAI_UB",
                "POP_EAI%_UB",
                "POP_EAI",
                "POP_EAI%",
            ]
        );

        let by_name: std::collections::HashMap<String, Vec<f64>> = table
            .value_columns()
            .into_iter()
            .map(|(name, values)| (name, values.to_vec()))
            .collect();

        // LB: 100*0.08 + 400*0.02 = 16; UB: 100*0 + 400*0.08 = 32.
        assert_eq!(by_name["POP_EAI_LB"][0], 16.0);
        assert_eq!(by_name["POP_EAI_UB"][0], 32.0);
        assert_eq!(by_name["POP_EAI"][0], 24.0);
        assert_eq!(by_name["POP_EAI%"][0], 2.4);
        assert_eq!(by_name["POP_EAI%_LB"][0], 1.6);
        assert_eq!(by_name["POP_EAI%_UB"][0], 3.2);
    }

    #[test]
    fn test_partials_resorted_to_rp_list_order() {
        let cfg = config(vec![10, 50], AnalysisMode::Function, vec![]);
        let model = ProbabilityModel::from_return_periods(&cfg.return_periods).unwrap();
        // Completion order reversed.
        let partials = vec![partial(50, 800.0, 400.0), partial(10, 500.0, 100.0)];

        let table = assemble(&cfg, &one_zone_set(), vec![1000.0], partials, &model).unwrap();
        let names: Vec<String> = table
            .metrics
            .iter()
            .map(|m| m.display_name(ExposureCategory::Population, false))
            .collect();
        assert_eq!(
            names,
            vec!["RP10_POP_exp", "RP50_POP_exp", "RP10_POP_imp", "RP50_POP_imp"]
        );
    }

    #[test]
    fn test_single_rp_has_no_annual_columns() {
        let cfg = config(vec![100], AnalysisMode::Function, vec![]);
        let model = ProbabilityModel::from_return_periods(&cfg.return_periods).unwrap();
        let table = assemble(
            &cfg,
            &one_zone_set(),
            vec![1000.0],
            vec![partial(100, 500.0, 250.0)],
            &model,
        )
        .unwrap();

        assert!(table.single_rp);
        assert!(table.annual.is_empty());
        let names: Vec<String> = table
            .value_columns()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        assert_eq!(names, vec!["ADM1_POP", "POP_exp", "POP_imp"]);
        assert!(names.iter().all(|n| !n.contains("EAI")));
    }

    #[test]
    fn test_classes_eae_cumulative_and_percent() {
        let cfg = config(vec![10, 100], AnalysisMode::Classes, vec![1.0, 2.0]);
        let model = ProbabilityModel::from_return_periods(&cfg.return_periods).unwrap();

        let class_partial = |rp: u32, c: [f64; 3]| RpPartial {
            rp,
            columns: (0..3usize)
                .rev()
                .map(|k| MetricColumn {
                    rp,
                    kind: MetricKind::ClassExposure(k),
                    values: vec![c[k]],
                })
                .collect(),
            affected_cells: 0,
        };

        // Cumulative inputs: non-increasing in k.
        let partials = vec![
            class_partial(10, [300.0, 120.0, 20.0]),
            class_partial(100, [700.0, 450.0, 200.0]),
        ];
        let table = assemble(&cfg, &one_zone_set(), vec![1000.0], partials, &model).unwrap();

        let by_name: std::collections::HashMap<String, Vec<f64>> = table
            .value_columns()
            .into_iter()
            .map(|(name, values)| (name, values.to_vec()))
            .collect();

        // Weights for [10, 100]: LB = [0.09, 0.01], UB = [0, 0.09],
        // Mean = [0.045, 0.05].
        let eae0: f64 = 300.0 * 0.045 + 700.0 * 0.05;
        assert!((by_name["POP_C0_EAE"][0] - (eae0 * 1000.0).round() / 1000.0).abs() < 1e-9);
        // Non-increasing across classes for every method.
        assert!(by_name["POP_C0_EAE"][0] >= by_name["POP_C1_EAE"][0]);
        assert!(by_name["POP_C1_EAE"][0] >= by_name["POP_C2_EAE"][0]);
        assert!(by_name["POP_C0_EAE_LB"][0] >= by_name["POP_C1_EAE_LB"][0]);

        // Percent columns divide by the startup total exposure.
        assert!((by_name["POP_C0_EAE%"][0] - (eae0 / 10.0 * 100.0).round() / 100.0).abs() < 5e-3);
    }

    #[test]
    fn test_zero_total_exposure_percent_is_zero() {
        let cfg = config(vec![10, 50], AnalysisMode::Function, vec![]);
        let model = ProbabilityModel::from_return_periods(&cfg.return_periods).unwrap();
        let table = assemble(
            &cfg,
            &one_zone_set(),
            vec![0.0],
            vec![partial(10, 0.0, 0.0), partial(50, 0.0, 0.0)],
            &model,
        )
        .unwrap();
        let by_name: std::collections::HashMap<String, Vec<f64>> = table
            .value_columns()
            .into_iter()
            .map(|(name, values)| (name, values.to_vec()))
            .collect();
        assert_eq!(by_name["POP_EAI%"][0], 0.0);
    }
}
