//! Topology Sequence Generator
//!
//! Drives the time loop of a scenario: for every instant in
//! `[START_TIME, START_TIME + DURATION_MINUTES]` it computes the positions of
//! the configured satellite subset, builds that instant's ISL topology and
//! hands the tagged snapshot to a [`SnapshotSink`].
//!
//! Snapshots are independent of each other. [`TopologySequenceGenerator::run`]
//! produces them one after another; [`TopologySequenceGenerator::run_pool`]
//! spreads them over a bounded worker pool with cooperative cancellation and
//! an optional per-snapshot timeout.

use thiserror::Error;

pub mod config;
pub mod generator;
pub mod loader;
pub mod sink;
pub mod snapshot;

pub use config::ScenarioConfig;
pub use generator::{PoolOptions, RunSummary, TopologySequence, TopologySequenceGenerator};
pub use sink::{DirectorySink, MemorySink, OutputFormat, RetryPolicy, SnapshotSink};
pub use snapshot::{SnapshotDiagnostics, SnapshotRecord, TopologySnapshot};

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Orbital error: {0}")]
    Orbital(#[from] orbital_mechanics::OrbitalError),
    #[error("Topology error: {0}")]
    Topology(#[from] isl_topology::TopologyError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to persist snapshot {step}: {reason}")]
    Persist { step: usize, reason: String },
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl GeneratorError {
    /// Whether the error aborts a run before any snapshot is produced
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GeneratorError::Configuration(_)
                | GeneratorError::Orbital(orbital_mechanics::OrbitalError::NoUsableElements { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, GeneratorError>;
