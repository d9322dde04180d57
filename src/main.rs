//! CLI entry point for the copier tool.

use anyhow::{Context, Result};
use clap::Parser;
use copier_core::SortEngine;
use tracing::debug;

mod app_config;
mod cli;

use app_config::{RunSettings, load_default_file_config};
use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let loaded = load_default_file_config()?;
    let settings = RunSettings::resolve(args, loaded.config.as_ref());

    // Priority: RUST_LOG env var > quiet/verbose flags > config verbosity > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.default_log_level()));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(
        ?settings,
        verbosity = settings.verbosity.as_str(),
        config_path = ?loaded.path,
        config_loaded = loaded.config.is_some(),
        "settings resolved"
    );

    let engine = SortEngine::new(settings.concurrency)?.with_dry_run(settings.dry_run);

    let stats = engine
        .run(&settings.src, &settings.dest)
        .await
        .with_context(|| format!("Failed to sort '{}'", settings.src.display()))?;

    debug!(
        total = stats.total(),
        peak_in_flight = stats.peak_in_flight(),
        concurrency = engine.concurrency(),
        "run statistics"
    );

    Ok(())
}
