//! ISL Topology - inter-satellite link graphs
//!
//! Builds one weighted topology graph per instant from Earth-fixed
//! satellite positions:
//!
//! - Link feasibility (maximum range, per-node degree bound)
//! - Replaceable candidate-pair enumeration (full scan, spatial grid)
//! - Edges weighted by distance and propagation delay
//! - Export to snapshot records and Cytoscape.js elements

use orbital_mechanics::SatelliteState;
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub mod candidates;
pub mod export;
pub mod link_model;

pub use candidates::{CandidateStrategy, FullScan, GridPartition, InRange};
pub use link_model::{LinkCandidate, LinkConstraints, LinkModel, Objective};

/// Speed of light in vacuum (km/s)
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Topology errors
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("Node not found: {0}")]
    NodeNotFound(u64),
    #[error("Duplicate node: {0}")]
    DuplicateNode(u64),
    #[error("Self-loop on node {0}")]
    SelfLoop(u64),
    #[error("Link {0}-{1} already present")]
    DuplicateLink(u64, u64),
    #[error("Invalid link constraints: {0}")]
    InvalidConstraints(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TopologyError>;

/// Euclidean distance between two positions (km)
pub fn distance_km(a: [f64; 3], b: [f64; 3]) -> f64 {
    orbital_mechanics::norm([a[0] - b[0], a[1] - b[1], a[2] - b[2]])
}

/// Signal transit time over `distance_km` (s)
pub fn propagation_delay_s(distance_km: f64) -> f64 {
    distance_km / SPEED_OF_LIGHT_KM_S
}

/// A satellite in one snapshot's graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SatelliteNode {
    pub id: u64,
    pub name: String,
    pub position_km: [f64; 3],
}

impl From<&SatelliteState> for SatelliteNode {
    fn from(state: &SatelliteState) -> Self {
        Self {
            id: state.id,
            name: state.name.clone(),
            position_km: state.position_km,
        }
    }
}

/// Link types in the constellation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LinkType {
    /// Inter-satellite link (laser)
    #[serde(rename = "ISL")]
    InterSatellite,
}

impl LinkType {
    pub fn tag(&self) -> &'static str {
        match self {
            LinkType::InterSatellite => "ISL",
        }
    }
}

/// An edge in the topology graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct IslLink {
    pub link_type: LinkType,
    pub distance_km: f64,
    pub delay_s: f64,
}

impl IslLink {
    pub fn inter_satellite(distance_km: f64) -> Self {
        Self {
            link_type: LinkType::InterSatellite,
            distance_km,
            delay_s: propagation_delay_s(distance_km),
        }
    }
}

/// Undirected topology of one instant. Each unordered pair appears at most
/// once and no node links to itself.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    graph: UnGraph<SatelliteNode, IslLink>,
    node_index: HashMap<u64, NodeIndex>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph
    pub fn add_node(&mut self, node: SatelliteNode) -> Result<NodeIndex> {
        if self.node_index.contains_key(&node.id) {
            return Err(TopologyError::DuplicateNode(node.id));
        }
        let id = node.id;
        let idx = self.graph.add_node(node);
        self.node_index.insert(id, idx);
        Ok(idx)
    }

    /// Add an undirected link between two existing nodes
    pub fn add_link(&mut self, from_id: u64, to_id: u64, link: IslLink) -> Result<()> {
        if from_id == to_id {
            return Err(TopologyError::SelfLoop(from_id));
        }
        let from_idx = *self
            .node_index
            .get(&from_id)
            .ok_or(TopologyError::NodeNotFound(from_id))?;
        let to_idx = *self
            .node_index
            .get(&to_id)
            .ok_or(TopologyError::NodeNotFound(to_id))?;

        if self.graph.find_edge(from_idx, to_idx).is_some() {
            return Err(TopologyError::DuplicateLink(from_id, to_id));
        }

        self.graph.add_edge(from_idx, to_idx, link);
        Ok(())
    }

    pub fn contains_node(&self, id: u64) -> bool {
        self.node_index.contains_key(&id)
    }

    /// Link between two nodes, in either direction
    pub fn get_link(&self, a: u64, b: u64) -> Option<&IslLink> {
        let a_idx = self.node_index.get(&a)?;
        let b_idx = self.node_index.get(&b)?;
        self.graph
            .find_edge(*a_idx, *b_idx)
            .map(|edge| &self.graph[edge])
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &SatelliteNode> {
        self.graph.node_weights()
    }

    /// Links in insertion order as (earlier node, later node, link)
    pub fn links(&self) -> impl Iterator<Item = (&SatelliteNode, &SatelliteNode, &IslLink)> {
        self.graph.edge_references().map(move |e| {
            let source = &self.graph[e.source()];
            let target = &self.graph[e.target()];
            (source, target, e.weight())
        })
    }

    pub fn degree(&self, id: u64) -> usize {
        self.node_index
            .get(&id)
            .map(|idx| self.graph.edges(*idx).count())
            .unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Remove every node without an incident link, keeping insertion order
    /// of the remaining nodes and links. Returns the number removed.
    pub fn prune_isolated(&mut self) -> usize {
        let mut graph: UnGraph<SatelliteNode, IslLink> =
            UnGraph::with_capacity(self.graph.node_count(), self.graph.edge_count());
        let mut remap = HashMap::new();

        for idx in self.graph.node_indices() {
            if self.graph.neighbors(idx).next().is_some() {
                remap.insert(idx, graph.add_node(self.graph[idx].clone()));
            }
        }
        for edge in self.graph.edge_references() {
            if let (Some(a), Some(b)) = (remap.get(&edge.source()), remap.get(&edge.target())) {
                graph.add_edge(*a, *b, *edge.weight());
            }
        }

        let removed = self.graph.node_count() - graph.node_count();
        self.node_index = graph
            .node_indices()
            .map(|idx| (graph[idx].id, idx))
            .collect();
        self.graph = graph;
        removed
    }

    /// Get graph statistics
    pub fn stats(&self) -> GraphStats {
        let nodes = self.graph.node_count();
        let links = self.graph.edge_count();

        let max_degree = self
            .graph
            .node_indices()
            .map(|idx| self.graph.edges(idx).count())
            .max()
            .unwrap_or(0);

        let delays: Vec<f64> = self.graph.edge_weights().map(|l| l.delay_s).collect();
        let mean_delay_ms = if delays.is_empty() {
            0.0
        } else {
            delays.iter().sum::<f64>() / delays.len() as f64 * 1000.0
        };
        let max_delay_ms = delays.iter().copied().fold(0.0, f64::max) * 1000.0;

        GraphStats {
            nodes,
            links,
            mean_degree: if nodes == 0 {
                0.0
            } else {
                2.0 * links as f64 / nodes as f64
            },
            max_degree,
            mean_delay_ms,
            max_delay_ms,
            components: connected_components(&self.graph),
        }
    }
}

/// Graph statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphStats {
    pub nodes: usize,
    pub links: usize,
    pub mean_degree: f64,
    pub max_degree: usize,
    pub mean_delay_ms: f64,
    pub max_delay_ms: f64,
    /// Connected components; 1 means the snapshot is connected
    pub components: usize,
}
