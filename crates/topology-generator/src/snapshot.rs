//! Per-instant topology snapshots and their persisted record layout

use chrono::{DateTime, SecondsFormat, Utc};
use isl_topology::export::{EdgeRecord, NodeRecord};
use isl_topology::{Objective, TopologyGraph};
use serde::{Deserialize, Serialize};

/// Per-snapshot counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotDiagnostics {
    /// Satellites of the subset whose position was requested
    pub satellites_considered: usize,
    /// Satellites excluded because propagation failed at this instant
    pub propagation_failures: usize,
    /// No link survived; the snapshot is still emitted
    pub empty: bool,
}

/// One instant's topology, tagged with its own step index and instant
#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    pub scenario: String,
    pub step: usize,
    /// Steps in the run this snapshot belongs to; sets the file name width
    pub steps_planned: usize,
    pub instant: DateTime<Utc>,
    pub objective: Objective,
    pub graph: TopologyGraph,
    pub diagnostics: SnapshotDiagnostics,
}

impl TopologySnapshot {
    /// ISO-8601 UTC timestamp
    pub fn timestamp(&self) -> String {
        self.instant.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.empty
    }

    /// `{scenario}_T{step}` followed by `extension`. The step is zero-padded
    /// to at least three digits, and to the width of the run's last step so
    /// names sort in step order.
    pub fn file_name(&self, extension: &str) -> String {
        let last = self.steps_planned.saturating_sub(1).max(self.step);
        let width = last.to_string().len().max(3);
        format!(
            "{}_T{:0width$}.{}",
            self.scenario,
            self.step,
            extension,
            width = width
        )
    }

    pub fn to_record(&self) -> SnapshotRecord {
        SnapshotRecord {
            scenario: self.scenario.clone(),
            step: self.step,
            timestamp: self.timestamp(),
            objective: self.objective,
            nodes: self.graph.node_records(),
            edges: self.graph.edge_records(),
            diagnostics: self.diagnostics,
        }
    }
}

/// Persisted snapshot layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRecord {
    pub scenario: String,
    pub step: usize,
    pub timestamp: String,
    pub objective: Objective,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
    pub diagnostics: SnapshotDiagnostics,
}
