//! CLI commands
//!
//! - default: run a risk analysis and export CSV + GeoPackage
//! - `weights`: print/write the exceedance-probability weight table
//! - `curve`: sample a vulnerability function (preview)
//! - `list-rps`: list the return periods available in a hazard folder

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use tracing::warn;

use crate::analysis::{self, SummaryRow};
use crate::config::{
    AnalysisMode, BoundarySource, ExposureCategory, HazardKind, Paths, Region, RunConfig,
};
use crate::hazard::HazardStore;
use crate::probability::ProbabilityModel;
use crate::vulnerability::{CustomFunction, FunctionRegistry, VulnerabilityFn};
use zonalgrid::ZonalStat;

#[derive(Subcommand)]
pub enum Commands {
    /// Print the exceedance-probability weight table for a set of RPs
    Weights {
        /// Return periods, comma separated (e.g. 10,100,500)
        #[arg(long = "rps", value_delimiter = ',', required = true)]
        return_periods: Vec<u32>,

        /// Also write the table as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Sample a vulnerability function over an intensity range (preview)
    Curve {
        /// Hazard type: FL, TC or CUSTOM
        #[arg(long, default_value = "FL")]
        hazard_type: String,

        /// Exposure category: POP, BU or AGR
        #[arg(long, default_value = "POP")]
        exposure: String,

        /// Custom expression in x (overrides the built-in curve)
        #[arg(long)]
        expr: Option<String>,

        /// World Bank region code for regionalised curves (e.g. EAP, AFR)
        #[arg(long, default_value = "Other")]
        wb_region: String,

        /// Upper end of the sampled intensity range
        #[arg(long, default_value_t = 1000.0)]
        max: f64,

        /// Number of samples
        #[arg(long, default_value_t = 20)]
        steps: usize,
    },

    /// List return periods available in the hazard folder of a run
    ListRps {
        #[arg(long)]
        country: String,

        /// Hazard type: FL, TC or CUSTOM
        #[arg(long, default_value = "FL")]
        hazard_type: String,

        /// Hazard category folder (e.g. FLUVIAL_UNDEFENDED)
        #[arg(long)]
        hazard_cat: String,

        #[arg(long, default_value = "2020")]
        period: String,

        #[arg(long)]
        scenario: Option<String>,
    },
}

/// Arguments of the default analysis command.
#[derive(Args)]
pub struct RunArgs {
    /// Country ISO a3 code (e.g. KHM)
    #[arg(long)]
    pub country: String,

    /// Hazard type: FL, TC or CUSTOM
    #[arg(long, default_value = "FL")]
    pub hazard_type: String,

    /// Hazard category folder (e.g. FLUVIAL_UNDEFENDED, COASTAL_UNDEFENDED)
    #[arg(long)]
    pub hazard_cat: String,

    /// Time period (2020 baseline or a projection horizon)
    #[arg(long, default_value = "2020")]
    pub period: String,

    /// Climate scenario (required for non-2020 periods, e.g. SSP3_7.0)
    #[arg(long)]
    pub scenario: Option<String>,

    /// Return periods, comma separated (e.g. 10,100,500)
    #[arg(long = "rps", value_delimiter = ',', required = true)]
    pub return_periods: Vec<u32>,

    /// Hazard values at or below this threshold are ignored
    #[arg(long, default_value_t = 0.0)]
    pub min_threshold: f64,

    /// Exposure category: POP, BU or AGR
    #[arg(long, default_value = "POP")]
    pub exposure: String,

    /// Exposure raster name override (file stem under DATA_DIR/EXP)
    #[arg(long)]
    pub exposure_name: Option<String>,

    /// Exposure reference year (recorded in the run report)
    #[arg(long, default_value = "2020")]
    pub exposure_year: String,

    /// Administrative level (0-2)
    #[arg(long, default_value_t = 1)]
    pub adm_level: u8,

    /// Analysis mode: function or classes
    #[arg(long, default_value = "function")]
    pub mode: String,

    /// Class edges for classes mode, comma separated ascending
    #[arg(long, value_delimiter = ',')]
    pub class_edges: Vec<f64>,

    /// Custom impact expression in x (overrides the built-in curve)
    #[arg(long)]
    pub impact_function: Option<String>,

    /// Zonal statistic for affected exposure: sum, mean or max
    #[arg(long, default_value = "sum")]
    pub zonal_stat: String,

    /// Custom boundaries GeoJSON file (instead of the country geopackage)
    #[arg(long)]
    pub boundaries_file: Option<PathBuf>,

    /// Zone code field in the custom boundaries file
    #[arg(long)]
    pub code_field: Option<String>,

    /// Zone name field in the custom boundaries file
    #[arg(long)]
    pub name_field: Option<String>,

    /// Save intermediate rasters (impact factor, affected exposure)
    #[arg(long)]
    pub save_intermediate: bool,

    /// Also export a GeoJSON rendition of the results
    #[arg(long)]
    pub geojson: bool,

    /// Worker pool size (default: min(#RPs, cores))
    #[arg(long, alias = "threads")]
    pub jobs: Option<usize>,

    /// Per-RP deadline in seconds; a stuck raster read fails the run
    /// instead of hanging it
    #[arg(long, default_value_t = 600)]
    pub rp_timeout: u64,
}

impl RunArgs {
    fn into_config(self) -> Result<RunConfig> {
        let hazard_kind =
            HazardKind::from_str(&self.hazard_type).map_err(|e| anyhow::anyhow!(e))?;
        let exposure = ExposureCategory::from_str(&self.exposure)?;
        let mode = AnalysisMode::from_str(&self.mode).map_err(|e| anyhow::anyhow!(e))?;
        let zonal_stat = ZonalStat::from_str(&self.zonal_stat).map_err(|e| anyhow::anyhow!(e))?;

        let boundaries = match self.boundaries_file {
            Some(path) => {
                let (Some(code_field), Some(name_field)) = (self.code_field, self.name_field)
                else {
                    bail!("--boundaries-file requires --code-field and --name-field");
                };
                BoundarySource::File {
                    path,
                    code_field,
                    name_field,
                }
            }
            None => BoundarySource::CountryGeopackage,
        };

        Ok(RunConfig {
            country: self.country.to_ascii_uppercase(),
            hazard_kind,
            hazard_category: self.hazard_cat,
            period: self.period,
            scenario: self.scenario,
            return_periods: self.return_periods,
            min_hazard_threshold: self.min_threshold,
            exposure,
            exposure_name: self.exposure_name,
            exposure_year: self.exposure_year,
            admin_level: self.adm_level,
            mode,
            class_edges: self.class_edges,
            custom_expression: self.impact_function,
            zonal_stat,
            boundaries,
            save_intermediate: self.save_intermediate,
            export_geojson: self.geojson,
            jobs: self.jobs,
            rp_deadline: Duration::from_secs(self.rp_timeout),
        })
    }
}

/// Execute the default analysis command.
pub async fn cmd_run(args: RunArgs) -> Result<()> {
    let paths = Paths::from_env()?;
    let cfg = args.into_config()?;
    let multi_rp = cfg.return_periods.len() > 1;
    let is_function = cfg.mode == AnalysisMode::Function;
    let return_periods = cfg.return_periods.clone();

    println!("=== Risk analysis {} ===", cfg.file_prefix());
    println!("Hazard: {} / {}", cfg.hazard_kind, cfg.hazard_category);
    println!("Return periods: {:?}", cfg.return_periods);
    println!("Exposure: {}", cfg.exposure);
    println!("Mode: {}", cfg.mode);
    println!("Workers: {}", cfg.worker_count());

    let outcome = analysis::run_analysis(&paths, cfg)
        .await
        .context("Analysis run failed")?;

    outcome.report.print_summary();

    if is_function && multi_rp {
        let model = ProbabilityModel::from_return_periods(&return_periods)?;
        print_summary_table(&analysis::summarize(&outcome.table, &model));
    }
    Ok(())
}

fn print_summary_table(rows: &[SummaryRow]) {
    if rows.is_empty() {
        return;
    }
    println!("Per-RP impact totals:");
    println!("{:>7} {:>10} {:>14} {:>10} {:>12}", "RP", "Freq", "Impact", "ExFreq", "EAI");
    let mut eai_total = 0.0;
    for row in rows {
        println!(
            "{:>7} {:>10.4} {:>14.3} {:>10.4} {:>12.3}",
            row.rp, row.frequency, row.impact_total, row.exceedance_band, row.eai_contribution
        );
        eai_total += row.eai_contribution;
    }
    println!("{:>7} {:>10} {:>14} {:>10} {:>12.3}", "", "", "", "total", eai_total);
}

/// Execute the `weights` command.
pub fn cmd_weights(return_periods: &[u32], output: Option<&std::path::Path>) -> Result<()> {
    let model = ProbabilityModel::from_return_periods(return_periods)?;
    println!("{:>7} {:>12} {:>12} {:>12} {:>12}", "RP", "prob", "LB", "UB", "Mean");
    for (rp, w) in model.iter() {
        println!(
            "{:>7} {:>12.6} {:>12.6} {:>12.6} {:>12.6}",
            rp, w.probability, w.lower, w.upper, w.mean
        );
    }
    if let Some(path) = output {
        model.write_csv(path)?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

/// Execute the `curve` command: sample a vulnerability function. This is the
/// one context where a malformed custom expression falls back (with a
/// warning) to the documented default instead of failing the run.
pub fn cmd_curve(
    hazard_type: &str,
    exposure: &str,
    expr: Option<&str>,
    wb_region: &str,
    max: f64,
    steps: usize,
) -> Result<()> {
    let function: Box<dyn VulnerabilityFn> = match expr {
        Some(source) => match CustomFunction::parse(source) {
            Ok(f) => Box::new(f),
            Err(e) => {
                warn!("invalid expression, using default preview curve: {e}");
                Box::new(CustomFunction::preview_default())
            }
        },
        None => {
            let hazard = HazardKind::from_str(hazard_type).map_err(|e| anyhow::anyhow!(e))?;
            let exposure = ExposureCategory::from_str(exposure)?;
            let region = Region::from_wb_code(wb_region);
            FunctionRegistry::with_builtins().resolve(hazard, exposure, region)?
        }
    };

    println!("# {}", function.name());
    println!("{:>12} {:>10}", "intensity", "impact");
    let steps = steps.max(2);
    for i in 0..=steps {
        let x = max * i as f64 / steps as f64;
        println!("{:>12.3} {:>10.6}", x, function.factor(x));
    }
    Ok(())
}

/// Execute the `list-rps` command.
pub fn cmd_list_rps(
    country: &str,
    hazard_type: &str,
    hazard_cat: &str,
    period: &str,
    scenario: Option<&str>,
) -> Result<()> {
    let paths = Paths::from_env()?;
    let hazard_kind = HazardKind::from_str(hazard_type).map_err(|e| anyhow::anyhow!(e))?;

    let mut dir = paths.data_dir.join("HZD");
    if hazard_kind == HazardKind::Custom {
        dir = dir.join("CUSTOM").join(hazard_cat);
    } else {
        dir = dir.join(country.to_ascii_uppercase()).join(hazard_cat).join(period);
        if let Some(scenario) = scenario {
            dir = dir.join(scenario);
        }
    }

    let store = HazardStore::new(dir.clone());
    let rps = store
        .discover()
        .with_context(|| format!("Cannot read hazard folder {}", dir.display()))?;
    if rps.is_empty() {
        println!("No hazard rasters (1in*.tif) found in {}", dir.display());
    } else {
        println!("Available return periods in {}:", dir.display());
        for rp in rps {
            println!("  1 in {rp}");
        }
    }
    Ok(())
}
