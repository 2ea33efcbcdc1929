use anyhow::{Context, Result};
use benchmark_leaderboard_rs::config::PipelineConfig;
use benchmark_leaderboard_rs::report::runs_csv;
use benchmark_leaderboard_rs::submission::load_submissions;
use clap::Parser;
use std::fs;
use std::path::PathBuf;

/// Flattens submissions into one CSV row per run
#[derive(Parser)]
#[command(author, version, about = "Export every run of every submission as CSV")]
struct Args {
    /// Directory searched recursively for submission JSON files
    #[arg(long)]
    submissions: PathBuf,

    /// Output CSV path
    #[arg(short, long, default_value = "results.csv")]
    output: PathBuf,

    /// TOML file with platform/environment aliases and pricing overrides
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = PipelineConfig::load_or_default(args.config.as_ref())
        .context("Failed to load configuration")?;
    let runs = load_submissions(&args.submissions, &config.normalization)?;
    let content = runs_csv(runs.runs())?;

    fs::write(&args.output, content)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    log::info!("Exported {} runs to '{}'", runs.len(), args.output.display());
    Ok(())
}
