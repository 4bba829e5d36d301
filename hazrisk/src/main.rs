//! CLI entry point for hazrisk

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Load .env at startup
fn load_env() {
    // Look for .env in the current directory, else next to the binary
    if dotenvy::dotenv().is_err() {
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod analysis;
mod cli;
mod config;
mod error;
mod export;
mod exposure;
mod hazard;
mod probability;
mod report;
mod vulnerability;
mod zones;

use cli::{Commands, RunArgs};

/// Probabilistic natural-hazard risk screening over exposure rasters
#[derive(Parser)]
#[command(name = "hazrisk")]
#[command(author, version)]
#[command(about = "Return-period hazard x exposure x vulnerability aggregation to administrative zones")]
#[command(
    long_about = "Computes affected/impacted exposure per return period, aggregates it to \
administrative zones and derives expected annual impact/exposure metrics.\n\nBy default runs a \
full analysis; see the subcommands for the probability-weight table, curve previews and hazard \
folder inspection."
)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Subcommand (default: run the analysis)
    #[command(subcommand)]
    command: Option<Commands>,

    /// Arguments of the default analysis command
    #[command(flatten)]
    run: Option<RunArgs>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before anything reads the environment
    load_env();

    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Some(Commands::Weights {
            return_periods,
            output,
        }) => {
            cli::cmd_weights(&return_periods, output.as_deref())?;
        }
        Some(Commands::Curve {
            hazard_type,
            exposure,
            expr,
            wb_region,
            max,
            steps,
        }) => {
            cli::cmd_curve(&hazard_type, &exposure, expr.as_deref(), &wb_region, max, steps)?;
        }
        Some(Commands::ListRps {
            country,
            hazard_type,
            hazard_cat,
            period,
            scenario,
        }) => {
            cli::cmd_list_rps(&country, &hazard_type, &hazard_cat, &period, scenario.as_deref())?;
        }
        None => {
            let args = cli
                .run
                .expect("analysis arguments required (--country, --hazard-cat, --rps)");
            info!(country = %args.country, hazard = %args.hazard_cat, "Starting analysis");
            cli::cmd_run(args).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
