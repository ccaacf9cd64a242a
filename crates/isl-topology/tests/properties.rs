//! Property tests for topology construction

use chrono::{TimeZone, Utc};
use isl_topology::{
    distance_km, GridPartition, LinkConstraints, LinkModel, SPEED_OF_LIGHT_KM_S,
};
use orbital_mechanics::SatelliteState;
use proptest::prelude::*;
use std::collections::HashSet;

// Positions inside a LEO shell-sized box, unique catalog numbers
fn states_strategy() -> impl Strategy<Value = Vec<SatelliteState>> {
    prop::collection::vec(
        (-8000.0f64..8000.0, -8000.0f64..8000.0, -8000.0f64..8000.0),
        0..40,
    )
    .prop_map(|coords| {
        let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        coords
            .into_iter()
            .enumerate()
            .map(|(i, (x, y, z))| SatelliteState {
                id: 50_000 + i as u64,
                name: format!("SAT-{}", i),
                position_km: [x, y, z],
                epoch,
            })
            .collect()
    })
}

fn constraints_strategy() -> impl Strategy<Value = LinkConstraints> {
    (100.0f64..6000.0, 1usize..6)
        .prop_map(|(d, k)| LinkConstraints::new(d, k).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_links_respect_range_and_delay(
        states in states_strategy(),
        constraints in constraints_strategy(),
    ) {
        let graph = LinkModel::new(constraints).build_topology(&states).unwrap();

        for (a, b, link) in graph.links() {
            prop_assert!(link.distance_km <= constraints.max_distance_km);
            prop_assert!((link.distance_km - distance_km(a.position_km, b.position_km)).abs() < 1e-9);
            prop_assert!((link.delay_s - link.distance_km / SPEED_OF_LIGHT_KM_S).abs() < 1e-15);
        }
    }

    #[test]
    fn prop_simple_graph_without_isolated_nodes(
        states in states_strategy(),
        constraints in constraints_strategy(),
    ) {
        let graph = LinkModel::new(constraints).build_topology(&states).unwrap();

        let mut pairs = HashSet::new();
        for (a, b, _) in graph.links() {
            prop_assert_ne!(a.id, b.id);
            prop_assert!(pairs.insert((a.id.min(b.id), a.id.max(b.id))));
        }
        for node in graph.nodes() {
            prop_assert!(graph.degree(node.id) >= 1);
        }
    }

    #[test]
    fn prop_each_node_adds_at_most_k_links(
        states in states_strategy(),
        constraints in constraints_strategy(),
    ) {
        let links = LinkModel::new(constraints).select_links(&states);
        for state in &states {
            let added = links.iter().filter(|l| l.source == state.id).count();
            prop_assert!(added <= constraints.max_degree_per_node);
        }
    }

    #[test]
    fn prop_construction_is_deterministic(
        states in states_strategy(),
        constraints in constraints_strategy(),
    ) {
        let model = LinkModel::new(constraints);
        let first = model.build_topology(&states).unwrap();
        let second = model.build_topology(&states).unwrap();

        prop_assert_eq!(first.node_records(), second.node_records());
        prop_assert_eq!(first.edge_records(), second.edge_records());
    }

    #[test]
    fn prop_grid_partition_matches_full_scan(
        states in states_strategy(),
        constraints in constraints_strategy(),
    ) {
        let full = LinkModel::new(constraints).select_links(&states);
        let grid = LinkModel::new(constraints)
            .with_strategy(GridPartition)
            .select_links(&states);
        prop_assert_eq!(full, grid);
    }
}
