//! Orbital state provider
//!
//! Holds the loaded (read-only) element sets and computes Earth-fixed
//! satellite states at arbitrary instants. Failures are per satellite: a
//! satellite that cannot be propagated is left out of that instant's batch
//! and reported in [`PositionBatch::failures`].

use crate::elements::{OrbitalElementSet, RawElementSet};
use crate::transforms::{teme_to_ecef, EARTH_RADIUS_KM};
use crate::{norm, OrbitalError, Result, SatelliteState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of loading a batch of raw element sets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
}

/// A satellite that could not be placed at an instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationFailure {
    pub id: u64,
    pub name: String,
    pub reason: String,
}

/// States of every satellite that propagated successfully at one instant,
/// in load order.
#[derive(Debug, Clone, Default)]
pub struct PositionBatch {
    pub instant: Option<DateTime<Utc>>,
    pub states: Vec<SatelliteState>,
    pub failures: Vec<PropagationFailure>,
}

impl PositionBatch {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Number of satellites excluded because propagation failed
    pub fn skipped(&self) -> usize {
        self.failures.len()
    }

    pub fn get(&self, id: u64) -> Option<&SatelliteState> {
        self.states.iter().find(|s| s.id == id)
    }
}

/// Compute the Earth-fixed position (km) of one satellite at `instant`.
pub fn compute_position(element_set: &OrbitalElementSet, instant: DateTime<Utc>) -> Result<[f64; 3]> {
    let id = element_set.id();
    let failed = |reason: String| OrbitalError::PropagationFailed { id, reason };

    let constants = sgp4::Constants::from_elements(element_set.elements())
        .map_err(|e| failed(format!("{:?}", e)))?;

    let minutes_since_epoch =
        instant.signed_duration_since(element_set.epoch()).num_milliseconds() as f64 / 60_000.0;

    let prediction = constants
        .propagate(minutes_since_epoch)
        .map_err(|e| failed(format!("{:?}", e)))?;

    let teme = [
        prediction.position[0],
        prediction.position[1],
        prediction.position[2],
    ];
    if !teme.iter().all(|c| c.is_finite()) {
        return Err(failed("non-finite position".to_string()));
    }

    let position = teme_to_ecef(teme, instant);
    let radius = norm(position);
    if radius < EARTH_RADIUS_KM {
        return Err(failed(format!("decayed: radius {:.1} km", radius)));
    }

    Ok(position)
}

/// Compute states for every element set at `instant`.
pub fn compute_all_positions(
    element_sets: &[OrbitalElementSet],
    instant: DateTime<Utc>,
) -> PositionBatch {
    let mut batch = PositionBatch {
        instant: Some(instant),
        states: Vec::with_capacity(element_sets.len()),
        failures: Vec::new(),
    };

    for set in element_sets {
        match compute_position(set, instant) {
            Ok(position_km) => batch.states.push(SatelliteState {
                id: set.id(),
                name: set.name().to_string(),
                position_km,
                epoch: instant,
            }),
            Err(e) => {
                debug!("Excluding {} ({}) at {}: {}", set.id(), set.name(), instant, e);
                batch.failures.push(PropagationFailure {
                    id: set.id(),
                    name: set.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    batch
}

/// Read-only collection of element sets shared by every instant
#[derive(Debug, Clone)]
pub struct OrbitalStateProvider {
    element_sets: Arc<[OrbitalElementSet]>,
}

impl OrbitalStateProvider {
    pub fn new(element_sets: Vec<OrbitalElementSet>) -> Result<Self> {
        if element_sets.is_empty() {
            return Err(OrbitalError::NoUsableElements { skipped: 0 });
        }
        Ok(Self {
            element_sets: element_sets.into(),
        })
    }

    /// Parse a batch of raw element sets. Malformed entries and repeated
    /// catalog numbers are skipped; only an empty result is an error.
    pub fn load(raw: impl IntoIterator<Item = RawElementSet>) -> Result<(Self, LoadReport)> {
        let mut sets = Vec::new();
        let mut seen = HashSet::new();
        let mut report = LoadReport::default();

        for entry in raw {
            match entry.parse() {
                Ok(set) if seen.insert(set.id()) => sets.push(set),
                Ok(set) => {
                    debug!("Skipping duplicate catalog number {}", set.id());
                    report.skipped += 1;
                }
                Err(e) => {
                    debug!("Skipping element set: {}", e);
                    report.skipped += 1;
                }
            }
        }
        report.loaded = sets.len();

        info!(
            "Loaded {} element sets ({} skipped)",
            report.loaded, report.skipped
        );

        if sets.is_empty() {
            return Err(OrbitalError::NoUsableElements {
                skipped: report.skipped,
            });
        }

        Ok((
            Self {
                element_sets: sets.into(),
            },
            report,
        ))
    }

    /// Provider over the first `subset_size` element sets in load order
    pub fn restrict(&self, subset_size: usize) -> Self {
        let n = subset_size.min(self.element_sets.len());
        Self {
            element_sets: self.element_sets[..n].to_vec().into(),
        }
    }

    pub fn element_sets(&self) -> &[OrbitalElementSet] {
        &self.element_sets
    }

    pub fn len(&self) -> usize {
        self.element_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.element_sets.is_empty()
    }

    pub fn compute_position(
        &self,
        element_set: &OrbitalElementSet,
        instant: DateTime<Utc>,
    ) -> Result<[f64; 3]> {
        compute_position(element_set, instant)
    }

    pub fn compute_all_positions(&self, instant: DateTime<Utc>) -> PositionBatch {
        compute_all_positions(&self.element_sets, instant)
    }
}
