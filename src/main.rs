//! journey-rebuild - batch journey reconstruction
//!
//! Reads pre-parsed instrumentation events (JSONL), reconstructs every
//! journey from every starting event in parallel and writes the journeys
//! to the egress file (JSONL).
//!
//! Module structure:
//! - `domain/` - Core types (Event, Journey, LocalId)
//! - `io/` - Event source and journey egress
//! - `services/` - Reconstruction pipeline (EventStore, PointGraph, PathSet, Coordinator)
//! - `infra/` - Infrastructure (Config, Errors, Metrics)

use anyhow::Context;
use clap::Parser;
use journey_rebuild::infra::{Config, Metrics};
use journey_rebuild::io::{read_events, Egress};
use journey_rebuild::services::Coordinator;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Rebuild per-data-unit journeys from instrumentation events
#[derive(Parser, Debug)]
#[command(name = "journey-rebuild", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/rebuild.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Events file, one JSON event per line
    #[arg(short, long)]
    events: String,

    /// Journey output file, overrides the configured egress file
    #[arg(short, long)]
    out: Option<String>,

    /// Worker threads (default: all cores)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Also write dead-end journeys
    #[arg(long)]
    include_unfinished: bool,
}

fn main() -> anyhow::Result<()> {
    // Structured logging, level via RUST_LOG (default: info)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    info!(git_hash = %env!("GIT_HASH"), "journey-rebuild starting");

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(out) = &args.out {
        config = config.with_egress_file(out);
    }
    if args.threads.is_some() {
        config = config.with_threads(args.threads);
    }

    let reconstruction_config = config.reconstruction().clone();
    info!(
        config_file = %config.config_file(),
        egress_file = %config.egress_file(),
        max_forks = ?reconstruction_config.max_forks_per_task,
        max_task_duration = ?reconstruction_config.max_task_duration,
        strict_global_ids = %reconstruction_config.strict_global_ids,
        threads = ?reconstruction_config.threads,
        "config_loaded"
    );

    let batch = read_events(&args.events)?;

    let started = Instant::now();
    let metrics = Arc::new(Metrics::new());
    let coordinator = Coordinator::with_metrics(reconstruction_config, metrics.clone());
    let reconstruction = coordinator.run(batch.events).context("Reconstruction failed")?;

    reconstruction.summary().log();
    metrics.report().log();

    let egress = Egress::new(config.egress_file())
        .with_unfinished(args.include_unfinished || config.egress_include_unfinished());
    let written = egress
        .write_journeys(reconstruction.journeys().values())
        .with_context(|| format!("Failed to write journeys to {}", config.egress_file()))?;

    info!(
        journeys_written = %written,
        elapsed_ms = %started.elapsed().as_millis(),
        "journey-rebuild finished"
    );
    Ok(())
}
