//! Strata runner service binary.
//!
//! Loads the pipeline configuration directory, reads credentials from the
//! environment, and drives the layered ingestion flows against the warehouse.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::core::FlowMode;
use crate::error::RunnerResult;

mod config;
mod core;
mod error;

/// Default parallelism across pipeline namespaces.
const DEFAULT_PARALLELISM: usize = 3;

#[derive(Parser)]
#[command(
    name = "strata-runner",
    about = "Layered warehouse ingestion: object store → RAW → STAGING → CURATED"
)]
struct Cli {
    /// Directory holding pipeline configuration files.
    #[arg(long, default_value = "configuration")]
    config_dir: PathBuf,

    /// Maximum number of pipeline namespaces processed concurrently.
    #[arg(long, default_value_t = DEFAULT_PARALLELISM)]
    parallelism: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Provision the warehouse and run the full ingestion sequence for every
    /// pipeline.
    Create,
    /// Restage the latest files, reingest, and rebuild STAGING and CURATED.
    Refresh,
}

/// Entry point for the runner service.
///
/// Loads configuration and starts the async runtime. Configuration and
/// credential errors abort before any warehouse mutation.
fn main() -> RunnerResult<()> {
    init_tracing();

    let cli = Cli::parse();
    let configs = config::load_runner_configs(&cli.config_dir)?;

    let mode = match cli.command {
        Command::Create => FlowMode::Create,
        Command::Refresh => FlowMode::Refresh,
    };

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(core::run(mode, configs, cli.parallelism));

    if let Err(err) = &result {
        error!("{err}");
    }

    result
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
