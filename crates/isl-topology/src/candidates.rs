//! Candidate-pair enumeration strategies
//!
//! A strategy answers one question: for each node (in iteration order),
//! which *later* nodes lie within range, and how far away are they. Every
//! unordered pair is reported at most once, from its earlier member.
//!
//! [`FullScan`] is the reference O(n²) implementation. [`GridPartition`]
//! bins positions into cubic cells whose edge equals the range, so only the
//! 27 surrounding cells are examined per node; it returns exactly the same
//! candidate sets.

use crate::distance_km;
use std::collections::HashMap;

/// A later node within range of the node being processed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InRange {
    /// Index into the position slice
    pub index: usize,
    pub distance_km: f64,
}

pub trait CandidateStrategy: Send + Sync {
    /// For every index `i`, the nodes `j > i` with
    /// `distance(i, j) <= max_distance_km`. The outer vector has one entry per
    /// position.
    fn candidates(&self, positions: &[[f64; 3]], max_distance_km: f64) -> Vec<Vec<InRange>>;

    fn name(&self) -> &'static str;
}

/// Examine every pair (i, j > i)
#[derive(Debug, Clone, Copy, Default)]
pub struct FullScan;

impl CandidateStrategy for FullScan {
    fn candidates(&self, positions: &[[f64; 3]], max_distance_km: f64) -> Vec<Vec<InRange>> {
        let mut result = vec![Vec::new(); positions.len()];

        for (i, pos_i) in positions.iter().enumerate() {
            for (j, pos_j) in positions.iter().enumerate().skip(i + 1) {
                let distance = distance_km(*pos_i, *pos_j);
                if distance <= max_distance_km {
                    result[i].push(InRange {
                        index: j,
                        distance_km: distance,
                    });
                }
            }
        }

        result
    }

    fn name(&self) -> &'static str {
        "full-scan"
    }
}

/// Uniform spatial grid with cell edge equal to the maximum range
#[derive(Debug, Clone, Copy, Default)]
pub struct GridPartition;

type Cell = (i64, i64, i64);

fn cell_of(pos: [f64; 3], size: f64) -> Cell {
    (
        (pos[0] / size).floor() as i64,
        (pos[1] / size).floor() as i64,
        (pos[2] / size).floor() as i64,
    )
}

impl CandidateStrategy for GridPartition {
    fn candidates(&self, positions: &[[f64; 3]], max_distance_km: f64) -> Vec<Vec<InRange>> {
        if !(max_distance_km.is_finite() && max_distance_km > 0.0) {
            return FullScan.candidates(positions, max_distance_km);
        }

        let mut cells: HashMap<Cell, Vec<usize>> = HashMap::new();
        for (i, pos) in positions.iter().enumerate() {
            cells.entry(cell_of(*pos, max_distance_km)).or_default().push(i);
        }

        let mut result = vec![Vec::new(); positions.len()];
        for (i, pos_i) in positions.iter().enumerate() {
            let (cx, cy, cz) = cell_of(*pos_i, max_distance_km);

            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        let key = (
                            cx.saturating_add(dx),
                            cy.saturating_add(dy),
                            cz.saturating_add(dz),
                        );
                        let Some(members) = cells.get(&key) else {
                            continue;
                        };
                        for &j in members.iter().filter(|&&j| j > i) {
                            let distance = distance_km(*pos_i, positions[j]);
                            if distance <= max_distance_km {
                                result[i].push(InRange {
                                    index: j,
                                    distance_km: distance,
                                });
                            }
                        }
                    }
                }
            }

            result[i].sort_by_key(|c| c.index);
            // Saturated cell coordinates can alias; keep each pair once
            result[i].dedup_by_key(|c| c.index);
        }

        result
    }

    fn name(&self) -> &'static str {
        "grid-partition"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(n: usize, radius: f64) -> Vec<[f64; 3]> {
        (0..n)
            .map(|k| {
                let theta = k as f64 * std::f64::consts::TAU / n as f64;
                [radius * theta.cos(), radius * theta.sin(), (k % 7) as f64 * 150.0]
            })
            .collect()
    }

    #[test]
    fn test_full_scan_visits_each_pair_once() {
        let positions = [[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [20.0, 0.0, 0.0]];
        let result = FullScan.candidates(&positions, 100.0);

        assert_eq!(result.len(), 3);
        assert_eq!(result[0].len(), 2);
        assert_eq!(result[1].len(), 1);
        assert!(result[2].is_empty());
        assert_eq!(result[1][0].index, 2);
    }

    #[test]
    fn test_range_boundary_is_inclusive() {
        let positions = [[0.0, 0.0, 0.0], [2700.0, 0.0, 0.0]];
        assert_eq!(FullScan.candidates(&positions, 2700.0)[0].len(), 1);
        assert_eq!(GridPartition.candidates(&positions, 2700.0)[0].len(), 1);
    }

    #[test]
    fn test_grid_matches_full_scan() {
        let positions = ring(120, 6928.0);

        let mut full = FullScan.candidates(&positions, 1500.0);
        for list in full.iter_mut() {
            list.sort_by_key(|c| c.index);
        }
        let grid = GridPartition.candidates(&positions, 1500.0);

        assert_eq!(full, grid);
        assert!(full.iter().any(|l| !l.is_empty()));
    }

    #[test]
    fn test_grid_handles_negative_coordinates() {
        let positions = [[-1.0, -1.0, -1.0], [1.0, 1.0, 1.0], [-5000.0, 0.0, 0.0]];
        let grid = GridPartition.candidates(&positions, 10.0);
        assert_eq!(grid[0].len(), 1);
        assert_eq!(grid[0][0].index, 1);
        assert!(grid[1].is_empty());
    }
}
