//! Orbital Mechanics Library
//!
//! SGP4 propagation of constellation element sets into a shared Earth-fixed
//! frame, so that positions of different satellites computed for the same
//! instant can be compared directly.
//!
//! # Frame convention
//!
//! SGP4 produces positions in the TEME frame. Every position is rotated
//! about the polar axis by Greenwich Mean Sidereal Time (IAU-82, UT1 taken
//! as UTC) into a pseudo Earth-fixed frame (PEF). Polar motion is ignored.
//! All satellites at one instant share the same rotation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod elements;
pub mod provider;

pub use elements::{parse_tle_text, OrbitalElementSet, RawElementSet};
pub use provider::{
    compute_all_positions, compute_position, LoadReport, OrbitalStateProvider, PositionBatch,
    PropagationFailure,
};

#[derive(Error, Debug)]
pub enum OrbitalError {
    #[error("Invalid TLE format: {0}")]
    InvalidTle(String),
    #[error("Invalid OMM record: {0}")]
    InvalidOmm(String),
    #[error("Invalid orbital elements for {id}: {reason}")]
    InvalidElements { id: u64, reason: String },
    #[error("Propagation failed for {id}: {reason}")]
    PropagationFailed { id: u64, reason: String },
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("No usable element sets ({skipped} skipped)")]
    NoUsableElements { skipped: usize },
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

/// Position of one satellite at one instant, Earth-fixed, kilometers.
///
/// Valid only for `epoch`; states are recomputed for every instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SatelliteState {
    pub id: u64,
    pub name: String,
    pub position_km: [f64; 3],
    pub epoch: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeodeticPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
}

impl SatelliteState {
    /// Geocentric radius in km
    pub fn radius_km(&self) -> f64 {
        norm(self.position_km)
    }

    /// Height above the equatorial radius in km
    pub fn altitude_km(&self) -> f64 {
        self.radius_km() - transforms::EARTH_RADIUS_KM
    }
}

/// Euclidean norm of a 3-vector
pub fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

pub mod transforms {
    use super::*;

    pub const EARTH_RADIUS_KM: f64 = 6378.137;
    pub const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;

    const SECONDS_PER_DAY: f64 = 86400.0;
    const UNIX_EPOCH_JD: f64 = 2440587.5;
    const J2000_JD: f64 = 2451545.0;

    /// Julian date of a UTC instant
    pub fn julian_date(time: DateTime<Utc>) -> f64 {
        let seconds = time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) * 1e-9;
        UNIX_EPOCH_JD + seconds / SECONDS_PER_DAY
    }

    /// Greenwich Mean Sidereal Time (IAU-82) in radians, range [0, 2π)
    pub fn gmst(time: DateTime<Utc>) -> f64 {
        let t = (julian_date(time) - J2000_JD) / 36525.0;
        let seconds = 67310.54841
            + (876600.0 * 3600.0 + 8640184.812866) * t
            + 0.093104 * t * t
            - 6.2e-6 * t * t * t;

        // 240 sidereal seconds per degree
        (seconds.rem_euclid(SECONDS_PER_DAY) / 240.0).to_radians()
    }

    /// Rotate a TEME position into the pseudo Earth-fixed frame at `time`
    pub fn teme_to_ecef(teme: [f64; 3], time: DateTime<Utc>) -> [f64; 3] {
        let (sin, cos) = gmst(time).sin_cos();
        [
            cos * teme[0] + sin * teme[1],
            -sin * teme[0] + cos * teme[1],
            teme[2],
        ]
    }

    /// WGS-84 geodetic coordinates of an Earth-fixed position
    pub fn ecef_to_geodetic(pos: [f64; 3]) -> Result<GeodeticPosition> {
        let [x, y, z] = pos;
        if !(x.is_finite() && y.is_finite() && z.is_finite()) || norm(pos) == 0.0 {
            return Err(OrbitalError::InvalidCoordinates(format!("{:?}", pos)));
        }

        let e2 = EARTH_FLATTENING * (2.0 - EARTH_FLATTENING);
        let p = (x * x + y * y).sqrt();
        let longitude = y.atan2(x).to_degrees();

        let mut lat = z.atan2(p * (1.0 - e2));
        let mut n = EARTH_RADIUS_KM;
        for _ in 0..5 {
            n = EARTH_RADIUS_KM / (1.0 - e2 * lat.sin().powi(2)).sqrt();
            lat = (z + e2 * n * lat.sin()).atan2(p);
        }

        let altitude_km = if lat.cos().abs() > 1e-10 {
            p / lat.cos() - n
        } else {
            z.abs() - n * (1.0 - e2)
        };

        Ok(GeodeticPosition {
            latitude: lat.to_degrees(),
            longitude,
            altitude_km,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::transforms::*;
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_gmst_at_j2000() {
        let j2000 = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert!((julian_date(j2000) - 2451545.0).abs() < 1e-9);
        assert!((gmst(j2000).to_degrees() - 280.46061837).abs() < 1e-4);
    }

    #[test]
    fn test_gmst_advances_with_earth_rotation() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::seconds(60);

        // ~0.2507 degrees of rotation per minute of UT
        let mut delta = (gmst(t1) - gmst(t0)).to_degrees();
        if delta < 0.0 {
            delta += 360.0;
        }
        assert!((delta - 0.25068).abs() < 1e-3);
    }

    #[test]
    fn test_rotation_preserves_distances() {
        let time = Utc.with_ymd_and_hms(2024, 3, 15, 6, 30, 0).unwrap();
        let a = [6900.0, 120.0, -40.0];
        let b = [4800.0, 4900.0, 300.0];

        let ea = teme_to_ecef(a, time);
        let eb = teme_to_ecef(b, time);

        assert!((norm(ea) - norm(a)).abs() < 1e-9);
        let d_teme = norm([a[0] - b[0], a[1] - b[1], a[2] - b[2]]);
        let d_ecef = norm([ea[0] - eb[0], ea[1] - eb[1], ea[2] - eb[2]]);
        assert!((d_teme - d_ecef).abs() < 1e-9);
        assert_eq!(ea[2], a[2]);
    }

    #[test]
    fn test_geodetic_reference_points() {
        let equator = ecef_to_geodetic([EARTH_RADIUS_KM + 550.0, 0.0, 0.0]).unwrap();
        assert!(equator.latitude.abs() < 1e-9);
        assert!(equator.longitude.abs() < 1e-9);
        assert!((equator.altitude_km - 550.0).abs() < 1e-6);

        let east = ecef_to_geodetic([0.0, EARTH_RADIUS_KM + 550.0, 0.0]).unwrap();
        assert!((east.longitude - 90.0).abs() < 1e-9);

        let polar_radius = EARTH_RADIUS_KM * (1.0 - EARTH_FLATTENING);
        let pole = ecef_to_geodetic([0.0, 0.0, polar_radius + 550.0]).unwrap();
        assert!((pole.latitude - 90.0).abs() < 1e-9);
        assert!((pole.altitude_km - 550.0).abs() < 1e-6);
    }

    #[test]
    fn test_geodetic_rejects_origin() {
        assert!(ecef_to_geodetic([0.0, 0.0, 0.0]).is_err());
        assert!(ecef_to_geodetic([f64::NAN, 1.0, 1.0]).is_err());
    }
}
