//! Time-stepped topology generation

use crate::config::ScenarioConfig;
use crate::sink::{persist_with_retry, RetryPolicy, SnapshotSink};
use crate::snapshot::{SnapshotDiagnostics, TopologySnapshot};
use crate::{GeneratorError, Result};
use chrono::{DateTime, Utc};
use isl_topology::{CandidateStrategy, GraphStats, LinkModel, Objective};
use orbital_mechanics::OrbitalStateProvider;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Worker pool settings for [`TopologySequenceGenerator::run_pool`]
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    /// Snapshots computed concurrently
    pub workers: usize,
    /// Upper bound on one snapshot's position and link computation
    pub snapshot_timeout: Option<Duration>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            snapshot_timeout: None,
        }
    }
}

/// Aggregated outcome of one run
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RunSummary {
    pub steps_planned: usize,
    /// Snapshots built, persisted or not
    pub snapshots: usize,
    pub persisted: usize,
    pub empty_snapshots: usize,
    /// Sum over all snapshots of satellites excluded by propagation failure
    pub propagation_failures: usize,
    /// Steps whose snapshot could not be persisted
    pub persist_failures: Vec<usize>,
    /// Steps abandoned after exceeding the snapshot timeout
    pub timed_out: Vec<usize>,
    pub cancelled: bool,
    /// Statistics of the lowest-step snapshot built
    pub first_stats: Option<GraphStats>,
}

impl RunSummary {
    fn record(&mut self, snapshot: &TopologySnapshot, persisted: bool) {
        self.snapshots += 1;
        if self.first_stats.is_none() {
            self.first_stats = Some(snapshot.graph.stats());
        }
        self.propagation_failures += snapshot.diagnostics.propagation_failures;
        if snapshot.is_empty() {
            self.empty_snapshots += 1;
        }
        if persisted {
            self.persisted += 1;
        } else {
            self.persist_failures.push(snapshot.step);
        }
    }

    /// Every planned snapshot was built and persisted
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.persisted == self.steps_planned
    }

    fn log(&self) {
        info!(
            "Run finished: {}/{} snapshots ({} persisted, {} empty), {} propagation failures",
            self.snapshots,
            self.steps_planned,
            self.persisted,
            self.empty_snapshots,
            self.propagation_failures
        );
        if let Some(stats) = &self.first_stats {
            info!(
                "First snapshot: mean degree {:.2}, delay mean {:.3} ms / max {:.3} ms, {} components",
                stats.mean_degree, stats.mean_delay_ms, stats.max_delay_ms, stats.components
            );
        }
        if !self.persist_failures.is_empty() {
            warn!("Snapshots not persisted: {:?}", self.persist_failures);
        }
        if !self.timed_out.is_empty() {
            warn!("Snapshots timed out: {:?}", self.timed_out);
        }
        if self.cancelled {
            warn!("Run cancelled before all steps were scheduled");
        }
    }
}

/// Snapshots of one run in step order, and the run's summary
#[derive(Debug, Clone, Default)]
pub struct TopologySequence {
    pub snapshots: Vec<TopologySnapshot>,
    pub summary: RunSummary,
}

enum StepOutcome {
    Built {
        snapshot: TopologySnapshot,
        persisted: bool,
    },
    TimedOut(usize),
}

impl StepOutcome {
    fn step(&self) -> usize {
        match self {
            StepOutcome::Built { snapshot, .. } => snapshot.step,
            StepOutcome::TimedOut(step) => *step,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopologySequenceGenerator {
    config: ScenarioConfig,
    provider: OrbitalStateProvider,
    model: LinkModel,
    end_time: DateTime<Utc>,
    time_step: chrono::Duration,
    steps_planned: usize,
    retry: RetryPolicy,
    retain_snapshots: bool,
}

impl TopologySequenceGenerator {
    /// Validate the scenario and bind it to the loaded element sets. The
    /// provider is restricted to the first `SUBSET_SIZE` element sets.
    pub fn new(config: ScenarioConfig, provider: OrbitalStateProvider) -> Result<Self> {
        config.validate()?;
        let model = LinkModel::new(config.link_constraints()?).with_objective(config.objective);
        let end_time = config.end_time()?;
        let time_step = config.time_step()?;
        let steps_planned = step_count(config.start_time, end_time, time_step)?;

        if provider.len() < config.subset_size {
            warn!(
                "SUBSET_SIZE is {} but only {} element sets are loaded",
                config.subset_size,
                provider.len()
            );
        }
        let provider = provider.restrict(config.subset_size);

        if config.include_ground_nodes {
            warn!(
                "Ground nodes are not modeled; {:?} is ignored and snapshots contain satellites only",
                config.gs_location_file
            );
        }
        if config.objective == Objective::Multi {
            info!("MULTI objective computes no additional weights; links carry delay only");
        }

        info!(
            "Scenario {} ({}): {} satellites, {} to {} every {}s, {} steps",
            config.scenario_name,
            config.constellation,
            provider.len(),
            config.start_time,
            end_time,
            config.time_step_seconds,
            steps_planned
        );
        debug!("Candidate pairs from {}", model.strategy_name());

        Ok(Self {
            config,
            provider,
            model,
            end_time,
            time_step,
            steps_planned,
            retry: RetryPolicy::default(),
            retain_snapshots: true,
        })
    }

    /// Replace the candidate-pair enumeration
    pub fn with_strategy(mut self, strategy: impl CandidateStrategy + 'static) -> Self {
        self.model = self.model.with_strategy(strategy);
        debug!("Candidate pairs from {}", self.model.strategy_name());
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Keep built snapshots in the returned sequence (default), or only hand
    /// them to the sink
    pub fn with_retained_snapshots(mut self, retain: bool) -> Self {
        self.retain_snapshots = retain;
        self
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn provider(&self) -> &OrbitalStateProvider {
        &self.provider
    }

    /// Number of instants in the run
    pub fn steps_planned(&self) -> usize {
        self.steps_planned
    }

    /// `start + k * step` for every `k` with the instant not after the end
    pub fn instants(&self) -> Vec<DateTime<Utc>> {
        let mut instants = Vec::with_capacity(self.steps_planned);
        let mut current = Some(self.config.start_time);
        while let Some(instant) = current.filter(|i| *i <= self.end_time) {
            instants.push(instant);
            current = instant.checked_add_signed(self.time_step);
        }
        instants
    }

    /// Build the snapshot of one instant
    pub fn snapshot_at(&self, step: usize, instant: DateTime<Utc>) -> Result<TopologySnapshot> {
        let batch = self.provider.compute_all_positions(instant);
        if batch.skipped() > 0 {
            debug!(
                "Step {}: {} satellites could not be propagated",
                step,
                batch.skipped()
            );
        }
        let altitudes = batch.states.iter().map(|s| s.altitude_km());
        if let Some((low, high)) = altitudes.fold(None, |range: Option<(f64, f64)>, alt| {
            Some(range.map_or((alt, alt), |(lo, hi)| (lo.min(alt), hi.max(alt))))
        }) {
            debug!("Step {}: altitudes {:.1} to {:.1} km", step, low, high);
        }

        let graph = self.model.build_topology(&batch.states)?;
        let diagnostics = SnapshotDiagnostics {
            satellites_considered: self.provider.len(),
            propagation_failures: batch.skipped(),
            empty: graph.edge_count() == 0,
        };

        let snapshot = TopologySnapshot {
            scenario: self.config.scenario_name.clone(),
            step,
            steps_planned: self.steps_planned,
            instant,
            objective: self.config.objective,
            graph,
            diagnostics,
        };

        if snapshot.is_empty() {
            warn!("Snapshot {} at {} has no links", step, snapshot.timestamp());
        } else {
            let stats = snapshot.graph.stats();
            info!(
                "[{}] Snapshot {}: {} nodes, {} links, mean degree {:.2}, delay {:.3}/{:.3} ms (mean/max), {} components",
                snapshot.timestamp(),
                step,
                stats.nodes,
                stats.links,
                stats.mean_degree,
                stats.mean_delay_ms,
                stats.max_delay_ms,
                stats.components
            );
        }

        Ok(snapshot)
    }

    fn persist<S: SnapshotSink + ?Sized>(&self, sink: &S, snapshot: &TopologySnapshot) -> bool {
        match persist_with_retry(sink, snapshot, &self.retry) {
            Ok(()) => true,
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    /// Generate every snapshot in step order on the calling thread
    pub fn run<S: SnapshotSink + ?Sized>(&self, sink: &S) -> Result<TopologySequence> {
        let instants = self.instants();
        let mut sequence = TopologySequence {
            snapshots: Vec::new(),
            summary: RunSummary {
                steps_planned: instants.len(),
                ..Default::default()
            },
        };

        for (step, instant) in instants.into_iter().enumerate() {
            let snapshot = self.snapshot_at(step, instant)?;
            let persisted = self.persist(sink, &snapshot);
            sequence.summary.record(&snapshot, persisted);
            if self.retain_snapshots {
                sequence.snapshots.push(snapshot);
            }
        }

        sequence.summary.log();
        Ok(sequence)
    }

    /// Generate snapshots on a bounded worker pool.
    ///
    /// At most `options.workers` snapshots are in flight. `cancel` is checked
    /// before each step is scheduled; steps already running complete and are
    /// persisted. A step exceeding `options.snapshot_timeout` is recorded in
    /// [`RunSummary::timed_out`] and not emitted; its blocking computation
    /// runs to completion in the background and the result is discarded.
    /// The returned snapshots are in step order regardless of completion
    /// order.
    pub async fn run_pool<S>(
        &self,
        sink: Arc<S>,
        options: PoolOptions,
        cancel: CancellationToken,
    ) -> Result<TopologySequence>
    where
        S: SnapshotSink + ?Sized + 'static,
    {
        let instants = self.instants();
        let mut summary = RunSummary {
            steps_planned: instants.len(),
            ..Default::default()
        };

        let generator = Arc::new(self.clone());
        let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
        let mut tasks = JoinSet::new();

        info!(
            "Generating {} snapshots with {} workers",
            instants.len(),
            options.workers.max(1)
        );

        for (step, instant) in instants.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Cancellation requested, not scheduling step {}", step);
                    summary.cancelled = true;
                    break;
                }
                permit = semaphore.clone().acquire_owned() => {
                    permit.map_err(|e| GeneratorError::Worker(e.to_string()))?
                }
            };

            let generator = generator.clone();
            let sink = sink.clone();
            tasks.spawn(generator.pool_step(step, instant, sink, permit, options.snapshot_timeout));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| GeneratorError::Worker(e.to_string()))??;
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(StepOutcome::step);

        let mut snapshots = Vec::new();
        for outcome in outcomes {
            match outcome {
                StepOutcome::Built {
                    snapshot,
                    persisted,
                } => {
                    summary.record(&snapshot, persisted);
                    if self.retain_snapshots {
                        snapshots.push(snapshot);
                    }
                }
                StepOutcome::TimedOut(step) => summary.timed_out.push(step),
            }
        }

        summary.log();
        Ok(TopologySequence { snapshots, summary })
    }

    async fn pool_step<S>(
        self: Arc<Self>,
        step: usize,
        instant: DateTime<Utc>,
        sink: Arc<S>,
        permit: OwnedSemaphorePermit,
        timeout: Option<Duration>,
    ) -> Result<StepOutcome>
    where
        S: SnapshotSink + ?Sized + 'static,
    {
        // The permit travels with the blocking work so an abandoned
        // computation still holds its worker slot until it returns
        let generator = self.clone();
        let compute = tokio::task::spawn_blocking(move || {
            let snapshot = generator.snapshot_at(step, instant);
            (snapshot, permit)
        });

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, compute).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Snapshot {} exceeded {:?}, skipping", step, limit);
                    return Ok(StepOutcome::TimedOut(step));
                }
            },
            None => compute.await,
        };
        let (snapshot, permit) = joined.map_err(|e| GeneratorError::Worker(e.to_string()))?;
        let snapshot = snapshot?;

        // Retries sleep, keep them off the async workers
        let generator = self.clone();
        let (snapshot, persisted) = tokio::task::spawn_blocking(move || {
            let persisted = generator.persist(&*sink, &snapshot);
            drop(permit);
            (snapshot, persisted)
        })
        .await
        .map_err(|e| GeneratorError::Worker(e.to_string()))?;

        Ok(StepOutcome::Built {
            snapshot,
            persisted,
        })
    }
}

/// Instants `start + k * step` not after `end`
fn step_count(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: chrono::Duration,
) -> Result<usize> {
    let span_ms = (end - start).num_milliseconds();
    let step_ms = step.num_milliseconds();
    if span_ms < 0 || step_ms <= 0 {
        return Err(GeneratorError::Configuration(format!(
            "no instants between {} and {} every {}",
            start, end, step
        )));
    }
    usize::try_from(span_ms / step_ms + 1).map_err(|_| {
        GeneratorError::Configuration(format!("too many steps between {} and {}", start, end))
    })
}
