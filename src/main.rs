//! CLI entry point for packet-relay.
//!
//! Provides the command-line interface for:
//! - Running one fixed-duration relay window (`run`)
//! - Validating a configuration file without starting threads (`check`)
//!
//! # Usage
//!
//! Run a relay window:
//! ```bash
//! packet-relay run --config relay.toml
//! ```
//!
//! Validate configuration only:
//! ```bash
//! packet-relay check --config relay.toml
//! ```
//!
//! Fatal startup problems (unreadable config, invalid identifier ranges,
//! an arena too small for a single frame) abort with a non-zero status
//! before any thread is spawned. Per-producer failures during a run are
//! logged and summarized but do not fail the process.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use packet_relay::{logging, RelayConfig, RelayDaemon};

#[derive(Parser)]
#[command(name = "packet-relay")]
#[command(about = "Multi-source packet relay over a bounded ring buffer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one relay window with the configured sources
    Run {
        /// Path to the TOML configuration file
        #[arg(long, default_value = "relay.toml")]
        config: PathBuf,
    },

    /// Validate a configuration file and exit
    Check {
        /// Path to the TOML configuration file
        #[arg(long, default_value = "relay.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run(config),
        Commands::Check { config } => check(config),
    }
}

fn run(config_path: PathBuf) -> Result<()> {
    let config = RelayConfig::load_from(&config_path)?;
    config.validate()?;
    logging::init(&config.application.log_level);

    info!(config = %config_path.display(), sources = config.sources.len(), "configuration loaded");

    let daemon = RelayDaemon::new(config)?;
    let summary = daemon.run()?;

    for err in &summary.producer_errors {
        warn!(%err, "producer failed during run");
    }
    info!(
        produced = summary.frames_produced,
        delivered = summary.frames_delivered,
        filtered = summary.frames_filtered,
        dropped = summary.frames_dropped,
        retries = summary.push_retries,
        "run summary"
    );
    Ok(())
}

fn check(config_path: PathBuf) -> Result<()> {
    let config = RelayConfig::load_from(&config_path)?;
    config.validate()?;
    println!(
        "ok: {} source(s), {} byte arena, {} worker(s)",
        config.sources.len(),
        config.buffer.capacity_bytes,
        config.consumers.workers
    );
    Ok(())
}
