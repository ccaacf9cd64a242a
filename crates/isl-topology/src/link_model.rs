//! Link feasibility engine
//!
//! Selection rule, applied in the iteration order of the input states:
//!
//! 1. For node `i`, the candidates are the later nodes `j` with
//!    `distance(i, j) <= max_distance_km`.
//! 2. Candidates are sorted by distance, ties by the later node's catalog
//!    number, and the first `max_degree_per_node` become links of `i`.
//! 3. Nodes left without any link are removed.
//!
//! The degree bound caps the links a node *adds* as the earlier member of a
//! pair. Later nodes can still receive links from earlier neighbours, so a
//! node's final degree may exceed the bound. This one-sided cap is the
//! selection policy; it is not a k-nearest-neighbour graph.

use crate::candidates::{CandidateStrategy, FullScan};
use crate::{
    distance_km, propagation_delay_s, IslLink, Result, SatelliteNode, TopologyError,
    TopologyGraph,
};
use orbital_mechanics::SatelliteState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Reference Starlink V1.0 maximum ISL range (km)
pub const DEFAULT_MAX_ISL_DISTANCE_KM: f64 = 2700.0;

/// Reference Starlink V1.0 terminals per satellite (2 intra-plane, 2 cross-plane)
pub const DEFAULT_MAX_ISL_PER_SAT: usize = 4;

/// Optimization objective the topology is generated for
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Objective {
    /// Links weighted by propagation delay only
    #[default]
    Single,
    /// Reserved. Produces the same weights as `Single`.
    Multi,
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Objective::Single => write!(f, "SINGLE"),
            Objective::Multi => write!(f, "MULTI"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LinkConstraints {
    pub max_distance_km: f64,
    pub max_degree_per_node: usize,
}

impl LinkConstraints {
    pub fn new(max_distance_km: f64, max_degree_per_node: usize) -> Result<Self> {
        if !(max_distance_km.is_finite() && max_distance_km > 0.0) {
            return Err(TopologyError::InvalidConstraints(format!(
                "max distance must be positive, got {}",
                max_distance_km
            )));
        }
        if max_degree_per_node == 0 {
            return Err(TopologyError::InvalidConstraints(
                "max degree per node must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_distance_km,
            max_degree_per_node,
        })
    }
}

impl Default for LinkConstraints {
    fn default() -> Self {
        Self {
            max_distance_km: DEFAULT_MAX_ISL_DISTANCE_KM,
            max_degree_per_node: DEFAULT_MAX_ISL_PER_SAT,
        }
    }
}

/// A selected link before it is added to the graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LinkCandidate {
    pub source: u64,
    pub target: u64,
    pub distance_km: f64,
    pub delay_s: f64,
}

#[derive(Clone)]
pub struct LinkModel {
    constraints: LinkConstraints,
    objective: Objective,
    strategy: Arc<dyn CandidateStrategy>,
}

impl fmt::Debug for LinkModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkModel")
            .field("constraints", &self.constraints)
            .field("objective", &self.objective)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl LinkModel {
    pub fn new(constraints: LinkConstraints) -> Self {
        Self {
            constraints,
            objective: Objective::Single,
            strategy: Arc::new(FullScan),
        }
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_strategy(mut self, strategy: impl CandidateStrategy + 'static) -> Self {
        self.strategy = Arc::new(strategy);
        self
    }

    pub fn constraints(&self) -> &LinkConstraints {
        &self.constraints
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Euclidean distance between two positions (km)
    pub fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
        distance_km(a, b)
    }

    /// Propagation delay over a distance (s)
    pub fn propagation_delay(distance_km: f64) -> f64 {
        propagation_delay_s(distance_km)
    }

    /// Apply range filter and degree bound; links in selection order
    pub fn select_links(&self, states: &[SatelliteState]) -> Vec<LinkCandidate> {
        let positions: Vec<[f64; 3]> = states.iter().map(|s| s.position_km).collect();
        let candidates = self
            .strategy
            .candidates(&positions, self.constraints.max_distance_km);

        let mut links = Vec::new();
        for (i, mut in_range) in candidates.into_iter().enumerate() {
            in_range.sort_by(|a, b| {
                a.distance_km
                    .total_cmp(&b.distance_km)
                    .then_with(|| states[a.index].id.cmp(&states[b.index].id))
            });

            links.extend(
                in_range
                    .into_iter()
                    .take(self.constraints.max_degree_per_node)
                    .map(|c| LinkCandidate {
                        source: states[i].id,
                        target: states[c.index].id,
                        distance_km: c.distance_km,
                        delay_s: propagation_delay_s(c.distance_km),
                    }),
            );
        }

        links
    }

    /// Build the topology graph of one instant. Isolated nodes are removed.
    pub fn build_topology(&self, states: &[SatelliteState]) -> Result<TopologyGraph> {
        let mut graph = TopologyGraph::new();
        for state in states {
            graph.add_node(SatelliteNode::from(state))?;
        }

        for link in self.select_links(states) {
            graph.add_link(
                link.source,
                link.target,
                IslLink::inter_satellite(link.distance_km),
            )?;
        }

        let removed = graph.prune_isolated();
        debug!(
            "Built topology with {} nodes and {} links ({} isolated removed, {})",
            graph.node_count(),
            graph.edge_count(),
            removed,
            self.strategy.name()
        );

        Ok(graph)
    }
}
