//! Graph export formats
//!
//! - Flat node/edge records (the persisted snapshot layout)
//! - Cytoscape.js elements for visualization

use crate::TopologyGraph;
use orbital_mechanics::transforms::ecef_to_geodetic;
use serde::{Deserialize, Serialize};

/// One node of a persisted snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub id: u64,
    pub name: String,
    pub position_km: [f64; 3],
}

/// One undirected edge of a persisted snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeRecord {
    pub source: u64,
    pub target: u64,
    pub distance_km: f64,
    pub delay_s: f64,
    #[serde(rename = "type")]
    pub link_type: String,
}

/// Cytoscape.js element format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CytoscapeElement {
    pub data: CytoscapeData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<CytoscapePosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CytoscapeData {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CytoscapePosition {
    pub x: f64,
    pub y: f64,
}

impl TopologyGraph {
    pub fn node_records(&self) -> Vec<NodeRecord> {
        self.nodes()
            .map(|n| NodeRecord {
                id: n.id,
                name: n.name.clone(),
                position_km: n.position_km,
            })
            .collect()
    }

    pub fn edge_records(&self) -> Vec<EdgeRecord> {
        self.links()
            .map(|(source, target, link)| EdgeRecord {
                source: source.id,
                target: target.id,
                distance_km: link.distance_km,
                delay_s: link.delay_s,
                link_type: link.link_type.tag().to_string(),
            })
            .collect()
    }

    /// Export to Cytoscape.js format
    pub fn to_cytoscape(&self) -> Vec<CytoscapeElement> {
        let mut elements = Vec::with_capacity(self.node_count() + self.edge_count());

        for node in self.nodes() {
            let geodetic = ecef_to_geodetic(node.position_km).ok();

            // Equirectangular placement from the sub-satellite point
            let position = geodetic.map(|g| CytoscapePosition {
                x: (g.longitude + 180.0) * 3.0,
                y: (90.0 - g.latitude) * 3.0,
            });

            elements.push(CytoscapeElement {
                data: CytoscapeData {
                    id: node.id.to_string(),
                    label: Some(node.name.clone()),
                    source: None,
                    target: None,
                    element_type: Some("satellite".to_string()),
                    altitude_km: geodetic.map(|g| g.altitude_km),
                    distance_km: None,
                    delay_ms: None,
                },
                position,
                classes: None,
            });
        }

        for (source, target, link) in self.links() {
            elements.push(CytoscapeElement {
                data: CytoscapeData {
                    id: format!("{}-{}", source.id, target.id),
                    label: None,
                    source: Some(source.id.to_string()),
                    target: Some(target.id.to_string()),
                    element_type: Some(link.link_type.tag().to_string()),
                    altitude_km: None,
                    distance_km: Some(link.distance_km),
                    delay_ms: Some(link.delay_s * 1000.0),
                },
                position: None,
                classes: Some("isl".to_string()),
            });
        }

        elements
    }

    /// Cytoscape.js elements as a JSON string
    pub fn to_cytoscape_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_cytoscape())?)
    }
}

#[cfg(test)]
mod tests {
    use crate::{IslLink, SatelliteNode, TopologyGraph};

    fn create_test_graph() -> TopologyGraph {
        let mut graph = TopologyGraph::new();
        graph
            .add_node(SatelliteNode {
                id: 44001,
                name: "SAT-A".to_string(),
                position_km: [6928.0, 0.0, 0.0],
            })
            .unwrap();
        graph
            .add_node(SatelliteNode {
                id: 44002,
                name: "SAT-B".to_string(),
                position_km: [0.0, 6928.0, 0.0],
            })
            .unwrap();
        graph
            .add_link(44001, 44002, IslLink::inter_satellite(1500.0))
            .unwrap();
        graph
    }

    #[test]
    fn test_records_follow_insertion_order() {
        let graph = create_test_graph();

        let nodes = graph.node_records();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id, 44001);
        assert_eq!(nodes[1].name, "SAT-B");

        let edges = graph.edge_records();
        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].source, edges[0].target), (44001, 44002));

        let json = serde_json::to_value(&edges[0]).unwrap();
        assert_eq!(json["type"], "ISL");
        assert_eq!(json["distance_km"], 1500.0);
    }

    #[test]
    fn test_cytoscape_export() {
        let graph = create_test_graph();
        let elements = graph.to_cytoscape();

        assert_eq!(elements.len(), 3);
        let sat_b = &elements[1];
        assert_eq!(sat_b.data.id, "44002");
        let pos = sat_b.position.as_ref().unwrap();
        // Longitude 90°, latitude 0°
        assert!((pos.x - 810.0).abs() < 1e-6);
        assert!((pos.y - 270.0).abs() < 1e-6);

        let edge = &elements[2];
        assert_eq!(edge.data.source.as_deref(), Some("44001"));
        assert_eq!(edge.data.element_type.as_deref(), Some("ISL"));

        let json = graph.to_cytoscape_json().unwrap();
        assert!(json.contains("\"44001-44002\""));
    }
}
