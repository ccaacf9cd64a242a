//! ISL Topology Generator CLI
//!
//! Generates one topology snapshot per time step of a scenario.
//!
//! Usage:
//!   isl-topogen --scenario scenarios/Starlink_V1_Normal.yaml \
//!               --elements data/STARLINK_TLE_20240101.txt \
//!               --output output/ --strategy grid

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use isl_topology::{FullScan, GridPartition};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use topology_generator::{
    loader, DirectorySink, OutputFormat, PoolOptions, ScenarioConfig, TopologySequenceGenerator,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Candidate-pair enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// Every pair of satellites
    #[default]
    FullScan,
    /// Spatial grid with cells the size of the maximum link distance
    Grid,
}

#[derive(Parser, Debug)]
#[command(
    name = "isl-topogen",
    about = "Generate time-stepped inter-satellite link topology snapshots"
)]
struct Args {
    /// Scenario YAML file
    #[arg(short, long)]
    scenario: PathBuf,

    /// Element file (TLE text, or OMM JSON array with a .json extension)
    #[arg(short, long)]
    elements: PathBuf,

    /// Ground element source; overrides GS_LOCATION_FILE
    #[arg(long)]
    ground_elements: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Snapshot file format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Candidate-pair enumeration; both produce the same links
    #[arg(long, value_enum, default_value_t = Strategy::FullScan)]
    strategy: Strategy,

    /// Snapshots computed concurrently (defaults to available cores)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Abandon a snapshot whose computation exceeds this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{}", "=".repeat(60));
    info!("ISL Topology Generator");
    info!("{}", "=".repeat(60));

    let mut config = ScenarioConfig::from_file(&args.scenario)?;
    if let Some(ground) = &args.ground_elements {
        config.gs_location_file = Some(ground.display().to_string());
    }

    let (provider, report) = loader::load_provider(&args.elements)?;
    if report.skipped > 0 {
        warn!("{} element sets skipped while loading", report.skipped);
    }

    let generator = TopologySequenceGenerator::new(config, provider)?.with_retained_snapshots(false);
    let generator = match args.strategy {
        Strategy::FullScan => generator.with_strategy(FullScan),
        Strategy::Grid => generator.with_strategy(GridPartition),
    };
    let sink = Arc::new(DirectorySink::new(&args.output, args.format)?);

    let mut options = PoolOptions::default();
    if let Some(workers) = args.workers {
        options.workers = workers;
    }
    options.snapshot_timeout = args.timeout_secs.map(Duration::from_secs);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight snapshots");
            on_signal.cancel();
        }
    });

    let sequence = generator
        .run_pool(sink, options, cancel)
        .await
        .context("topology generation failed")?;
    let summary = sequence.summary;

    // Summary
    info!("{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    info!("Snapshots written: {}/{}", summary.persisted, summary.steps_planned);
    info!("Empty snapshots: {}", summary.empty_snapshots);
    info!("Propagation failures: {}", summary.propagation_failures);
    if let Some(stats) = &summary.first_stats {
        info!(
            "First snapshot: {} nodes, {} links, mean degree {:.2} (max {}), delay {:.3} ms mean / {:.3} ms max, {} components",
            stats.nodes,
            stats.links,
            stats.mean_degree,
            stats.max_degree,
            stats.mean_delay_ms,
            stats.max_delay_ms,
            stats.components
        );
    }

    if !summary.is_complete() {
        bail!(
            "incomplete run: {} not persisted, {} timed out{}",
            summary.persist_failures.len(),
            summary.timed_out.len(),
            if summary.cancelled { ", cancelled" } else { "" }
        );
    }

    Ok(())
}
