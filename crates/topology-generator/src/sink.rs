//! Snapshot persistence
//!
//! A [`SnapshotSink`] receives every snapshot exactly once, possibly out of
//! step order when the worker pool is used. Each persisted record carries its
//! own step index and timestamp.

use crate::snapshot::{SnapshotRecord, TopologySnapshot};
use crate::{GeneratorError, Result};
use backoff::ExponentialBackoff;
use isl_topology::export::CytoscapeElement;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

pub trait SnapshotSink: Send + Sync {
    fn persist(&self, snapshot: &TopologySnapshot) -> Result<()>;
}

/// Exponential backoff applied around [`SnapshotSink::persist`]
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Give up once this much time has passed since the first attempt
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            max_elapsed: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retry
    pub fn none() -> Self {
        Self {
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            max_elapsed: Duration::ZERO,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            current_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        }
    }
}

/// Persist one snapshot, retrying transient failures. Serialization errors
/// are not retried.
pub fn persist_with_retry<S: SnapshotSink + ?Sized>(
    sink: &S,
    snapshot: &TopologySnapshot,
    policy: &RetryPolicy,
) -> Result<()> {
    let op = || {
        sink.persist(snapshot).map_err(|e| match e {
            GeneratorError::Json(_) => backoff::Error::permanent(e),
            other => backoff::Error::transient(other),
        })
    };
    let notify = |err: GeneratorError, wait: Duration| {
        warn!(
            "Persisting snapshot {} failed, retrying in {:?}: {}",
            snapshot.step, wait, err
        );
    };

    backoff::retry_notify(policy.backoff(), op, notify).map_err(|e| {
        let err = match e {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        };
        GeneratorError::Persist {
            step: snapshot.step,
            reason: err.to_string(),
        }
    })
}

/// Collects snapshot records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<SnapshotRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records sorted by step index
    pub fn records(&self) -> Vec<SnapshotRecord> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        records.sort_by_key(|r| r.step);
        records
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotSink for MemorySink {
    fn persist(&self, snapshot: &TopologySnapshot) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(snapshot.to_record());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Snapshot record (nodes, edges, diagnostics)
    #[default]
    Json,
    /// Cytoscape.js elements
    Cytoscape,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Cytoscape => "cyjs",
        }
    }
}

#[derive(Serialize)]
struct CytoscapeDocument<'a> {
    scenario: &'a str,
    step: usize,
    timestamp: String,
    elements: Vec<CytoscapeElement>,
}

/// One file per snapshot, named `{scenario}_T{step}.{ext}` (see
/// [`TopologySnapshot::file_name`])
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    format: OutputFormat,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>, format: OutputFormat) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!("Writing {:?} snapshots to {:?}", format, dir);
        Ok(Self { dir, format })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, snapshot: &TopologySnapshot) -> PathBuf {
        self.dir.join(snapshot.file_name(self.format.extension()))
    }

    fn encode(&self, snapshot: &TopologySnapshot) -> Result<Vec<u8>> {
        let bytes = match self.format {
            OutputFormat::Json => serde_json::to_vec_pretty(&snapshot.to_record())?,
            OutputFormat::Cytoscape => serde_json::to_vec_pretty(&CytoscapeDocument {
                scenario: &snapshot.scenario,
                step: snapshot.step,
                timestamp: snapshot.timestamp(),
                elements: snapshot.graph.to_cytoscape(),
            })?,
        };
        Ok(bytes)
    }
}

impl SnapshotSink for DirectorySink {
    fn persist(&self, snapshot: &TopologySnapshot) -> Result<()> {
        let bytes = self.encode(snapshot)?;
        let path = self.path_for(snapshot);

        // Readers never see a partially written file
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;

        debug!("Wrote {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotDiagnostics;
    use crate::test_support::t0;
    use isl_topology::{Objective, TopologyGraph};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn empty_snapshot(step: usize) -> TopologySnapshot {
        TopologySnapshot {
            scenario: "Sink_Test".to_string(),
            step,
            steps_planned: 10,
            instant: t0(),
            objective: Objective::Single,
            graph: TopologyGraph::new(),
            diagnostics: SnapshotDiagnostics {
                empty: true,
                ..Default::default()
            },
        }
    }

    /// Fails the first `failures` attempts
    struct FlakySink {
        failures: usize,
        attempts: AtomicUsize,
    }

    impl SnapshotSink for FlakySink {
        fn persist(&self, _snapshot: &TopologySnapshot) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk busy").into());
            }
            Ok(())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            max_elapsed: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let sink = FlakySink {
            failures: 2,
            attempts: AtomicUsize::new(0),
        };
        persist_with_retry(&sink, &empty_snapshot(0), &fast_retry()).unwrap();
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exhausted_retries_report_step() {
        let sink = FlakySink {
            failures: usize::MAX,
            attempts: AtomicUsize::new(0),
        };
        let policy = RetryPolicy {
            max_elapsed: Duration::from_millis(30),
            ..fast_retry()
        };

        match persist_with_retry(&sink, &empty_snapshot(4), &policy) {
            Err(GeneratorError::Persist { step, reason }) => {
                assert_eq!(step, 4);
                assert!(reason.contains("disk busy"));
            }
            other => panic!("expected persist error, got {:?}", other),
        }
        assert!(sink.attempts.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_directory_sink_writes_named_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("out"), OutputFormat::Json).unwrap();

        sink.persist(&empty_snapshot(3)).unwrap();

        let path = dir.path().join("out").join("Sink_Test_T003.json");
        let record: SnapshotRecord =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(record.step, 3);
        assert!(record.diagnostics.empty);
        assert!(record.nodes.is_empty());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_cytoscape_format() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path(), OutputFormat::Cytoscape).unwrap();

        let snapshot = empty_snapshot(0);
        sink.persist(&snapshot).unwrap();

        let path = sink.path_for(&snapshot);
        assert!(path.ends_with("Sink_Test_T000.cyjs"));
        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["step"], 0);
        assert!(doc["elements"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_memory_sink_orders_by_step() {
        let sink = MemorySink::new();
        for step in [2, 0, 1] {
            sink.persist(&empty_snapshot(step)).unwrap();
        }
        let steps: Vec<usize> = sink.records().iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![0, 1, 2]);
        assert_eq!(sink.len(), 3);
    }
}
