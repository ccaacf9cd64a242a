//! Orbital element sets: parsing from TLE text or OMM JSON, and validation

use crate::{OrbitalError, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// An unparsed element set as delivered by the data source
#[derive(Debug, Clone)]
pub enum RawElementSet {
    /// Two-line element set with an optional name line
    Tle {
        name: Option<String>,
        line1: String,
        line2: String,
    },
    /// One CelesTrak OMM JSON object
    Omm(serde_json::Value),
}

impl RawElementSet {
    pub fn tle(name: impl Into<String>, line1: impl Into<String>, line2: impl Into<String>) -> Self {
        Self::Tle {
            name: Some(name.into()),
            line1: line1.into(),
            line2: line2.into(),
        }
    }

    pub fn parse(self) -> Result<OrbitalElementSet> {
        match self {
            Self::Tle { name, line1, line2 } => {
                OrbitalElementSet::from_tle(name.as_deref(), &line1, &line2)
            }
            Self::Omm(value) => OrbitalElementSet::from_omm(value),
        }
    }
}

/// Split TLE text (two- or three-line format) into raw entries.
///
/// Line pairs that cannot be completed are still emitted so that they are
/// counted as skipped when loaded.
pub fn parse_tle_text(text: &str) -> Vec<RawElementSet> {
    let mut entries = Vec::new();
    let mut name: Option<String> = None;
    let mut lines = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .peekable();

    while let Some(line) = lines.next() {
        if line.starts_with("1 ") {
            let line2 = if lines.peek().is_some_and(|next| next.starts_with("2 ")) {
                lines.next().unwrap_or_default()
            } else {
                ""
            };
            entries.push(RawElementSet::Tle {
                name: name.take(),
                line1: line.to_string(),
                line2: line2.to_string(),
            });
        } else if line.starts_with("2 ") {
            entries.push(RawElementSet::Tle {
                name: name.take(),
                line1: String::new(),
                line2: line.to_string(),
            });
        } else {
            // 3LE files prefix the name line with "0 "
            let label = line.strip_prefix("0 ").unwrap_or(line).trim().to_string();
            if let Some(orphan) = name.replace(label) {
                debug!("Dropping name line without elements: {}", orphan);
            }
        }
    }

    entries
}

/// A validated element set for one satellite. Immutable once loaded.
#[derive(Clone)]
pub struct OrbitalElementSet {
    elements: Arc<sgp4::Elements>,
    name: String,
    epoch: DateTime<Utc>,
}

impl fmt::Debug for OrbitalElementSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrbitalElementSet")
            .field("id", &self.id())
            .field("name", &self.name)
            .field("epoch", &self.epoch)
            .field("mean_motion", &self.mean_motion())
            .field("eccentricity", &self.eccentricity())
            .finish()
    }
}

impl OrbitalElementSet {
    pub fn from_tle(name: Option<&str>, line1: &str, line2: &str) -> Result<Self> {
        let elements = sgp4::Elements::from_tle(
            name.map(str::to_owned),
            line1.as_bytes(),
            line2.as_bytes(),
        )
        .map_err(|e| OrbitalError::InvalidTle(format!("{:?}", e)))?;

        Self::from_elements(elements)
    }

    pub fn from_omm(value: serde_json::Value) -> Result<Self> {
        let elements: sgp4::Elements =
            serde_json::from_value(value).map_err(|e| OrbitalError::InvalidOmm(e.to_string()))?;

        Self::from_elements(elements)
    }

    pub fn from_elements(elements: sgp4::Elements) -> Result<Self> {
        let id = u64::from(elements.norad_id);
        let invalid = |reason: &str| OrbitalError::InvalidElements {
            id,
            reason: reason.to_string(),
        };

        let parameters = [
            elements.mean_motion,
            elements.eccentricity,
            elements.inclination,
            elements.right_ascension,
            elements.argument_of_perigee,
            elements.mean_anomaly,
            elements.drag_term,
        ];
        if !parameters.iter().all(|p| p.is_finite()) {
            return Err(invalid("non-finite orbital parameter"));
        }
        if !(0.0..1.0).contains(&elements.eccentricity) {
            return Err(invalid("eccentricity outside [0, 1)"));
        }
        if elements.mean_motion <= 0.0 {
            return Err(invalid("mean motion must be positive"));
        }

        let name = elements
            .object_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("NORAD-{}", id));
        let epoch = DateTime::<Utc>::from_naive_utc_and_offset(elements.datetime, Utc);

        Ok(Self {
            elements: Arc::new(elements),
            name,
            epoch,
        })
    }

    /// Catalog number
    pub fn id(&self) -> u64 {
        u64::from(self.elements.norad_id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Revolutions per day
    pub fn mean_motion(&self) -> f64 {
        self.elements.mean_motion
    }

    pub fn eccentricity(&self) -> f64 {
        self.elements.eccentricity
    }

    /// Degrees
    pub fn inclination(&self) -> f64 {
        self.elements.inclination
    }

    /// Right ascension of the ascending node, degrees
    pub fn raan(&self) -> f64 {
        self.elements.right_ascension
    }

    /// Degrees
    pub fn arg_perigee(&self) -> f64 {
        self.elements.argument_of_perigee
    }

    /// Degrees
    pub fn mean_anomaly(&self) -> f64 {
        self.elements.mean_anomaly
    }

    /// B* drag term, 1/earth radii
    pub fn drag_term(&self) -> f64 {
        self.elements.drag_term
    }

    pub(crate) fn elements(&self) -> &sgp4::Elements {
        &self.elements
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Five satellites in one 550 km plane spaced 20° in mean anomaly, plus
    /// one element set whose semi-major axis lies below the Earth's surface.
    pub const SYNTHETIC_3LE: &str = "\
SYNTH-1
1 44001U 20001A   24001.00000000  .00000000  00000+0  00000+0 0  9997
2 44001  53.0000   0.0000 0001000   0.0000   0.0000 15.06000000    13
SYNTH-2
1 44002U 20001A   24001.00000000  .00000000  00000+0  00000+0 0  9998
2 44002  53.0000   0.0000 0001000   0.0000  20.0000 15.06000000    16
SYNTH-3
1 44003U 20001A   24001.00000000  .00000000  00000+0  00000+0 0  9999
2 44003  53.0000   0.0000 0001000   0.0000  40.0000 15.06000000    19
SYNTH-4
1 44004U 20001A   24001.00000000  .00000000  00000+0  00000+0 0  9990
2 44004  53.0000   0.0000 0001000   0.0000  60.0000 15.06000000    12
SYNTH-5
1 44005U 20001A   24001.00000000  .00000000  00000+0  00000+0 0  9991
2 44005  53.0000   0.0000 0001000   0.0000  80.0000 15.06000000    15
SYNTH-DECAYED
1 44099U 20001A   24001.00000000  .00000000  00000+0  00000+0 0  9994
2 44099  53.0000   0.0000 0001000   0.0000   0.0000 17.50000000    11
";
}
