use anyhow::{Context, Result};
use benchmark_leaderboard_rs::config::PipelineConfig;
use benchmark_leaderboard_rs::pipeline;
use benchmark_leaderboard_rs::report::leaderboard_table;
use clap::Parser;
use std::path::PathBuf;

/// Builds the price-adjusted leaderboard from a directory of submissions
#[derive(Parser)]
#[command(author, version, about = "Rank benchmark submissions by throughput per dollar")]
struct Args {
    /// Directory searched recursively for submission JSON files
    #[arg(long)]
    submissions: PathBuf,

    /// Directory holding datasets.csv, algorithms.csv, timeouts.csv,
    /// size_ordering.csv and optionally platforms.csv
    #[arg(long)]
    reference: PathBuf,

    /// Directory the report tables are written to
    #[arg(long, default_value = "leaderboard")]
    output: PathBuf,

    /// TOML file with aliases, pricing overrides and penalty settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose logging output
    #[arg(short, long)]
    verbose: bool,

    /// Do not print the leaderboard
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = PipelineConfig::load_or_default(args.config.as_ref())
        .context("Failed to load configuration")?;

    let leaderboard = pipeline::run(&args.submissions, &args.reference, &args.output, &config)
        .with_context(|| format!("Leaderboard pass over '{}' failed", args.submissions.display()))?;

    if !args.quiet {
        leaderboard_table(&leaderboard.ranked, config.display.throughput_scale)
            .print("Leaderboard (throughput per dollar x scale)");
    }

    Ok(())
}
