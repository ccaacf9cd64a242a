//! Scenario configuration (YAML)
//!
//! ```yaml
//! SCENARIO_NAME: Starlink_V1_Normal
//! CONSTELLATION: STARLINK
//! SUBSET_SIZE: 200
//! INCLUDE_GROUND_NODES: false
//! OBJECTIVE: SINGLE
//! START_TIME: "2024-01-01T00:00:00Z"
//! DURATION_MINUTES: 10
//! TIME_STEP_SECONDS: 60
//! ```

use crate::{GeneratorError, Result};
use chrono::{DateTime, Duration, Utc};
use isl_topology::link_model::{DEFAULT_MAX_ISL_DISTANCE_KM, DEFAULT_MAX_ISL_PER_SAT};
use isl_topology::{LinkConstraints, Objective};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

fn default_max_isl_distance_km() -> f64 {
    DEFAULT_MAX_ISL_DISTANCE_KM
}

fn default_max_isl_per_sat() -> usize {
    DEFAULT_MAX_ISL_PER_SAT
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ScenarioConfig {
    /// Prefix of every output file
    pub scenario_name: String,
    pub constellation: String,
    /// Number of satellites considered, in load order
    pub subset_size: usize,
    #[serde(default)]
    pub include_ground_nodes: bool,
    /// Ground element source; required when ground nodes are included
    #[serde(default)]
    pub gs_location_file: Option<String>,
    #[serde(default)]
    pub objective: Objective,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: f64,
    pub time_step_seconds: u64,
    #[serde(default = "default_max_isl_distance_km")]
    pub max_isl_distance_km: f64,
    #[serde(default = "default_max_isl_per_sat")]
    pub max_isl_per_sat: usize,
}

impl ScenarioConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| GeneratorError::Configuration(format!("invalid scenario: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading scenario from {:?}", path);

        let yaml = std::fs::read_to_string(path).map_err(|e| {
            GeneratorError::Configuration(format!("cannot read scenario {:?}: {}", path, e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(GeneratorError::Configuration(msg));

        let name = self.scenario_name.trim();
        if name.is_empty() {
            return invalid("SCENARIO_NAME must not be empty".to_string());
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return invalid(format!(
                "SCENARIO_NAME must be usable as a file name: {:?}",
                self.scenario_name
            ));
        }
        if self.constellation.trim().is_empty() {
            return invalid("CONSTELLATION must not be empty".to_string());
        }
        if self.subset_size == 0 {
            return invalid("SUBSET_SIZE must be greater than 0".to_string());
        }
        if self.time_step_seconds == 0 {
            return invalid("TIME_STEP_SECONDS must be greater than 0".to_string());
        }
        if !(self.duration_minutes.is_finite() && self.duration_minutes >= 0.0) {
            return invalid(format!(
                "DURATION_MINUTES must be a non-negative number, got {}",
                self.duration_minutes
            ));
        }
        if self.include_ground_nodes
            && self
                .gs_location_file
                .as_deref()
                .map_or(true, |f| f.trim().is_empty())
        {
            return invalid(
                "GS_LOCATION_FILE is required when INCLUDE_GROUND_NODES is true".to_string(),
            );
        }
        self.time_step()?;
        self.end_time()?;
        self.link_constraints()?;

        Ok(())
    }

    pub fn link_constraints(&self) -> Result<LinkConstraints> {
        LinkConstraints::new(self.max_isl_distance_km, self.max_isl_per_sat)
            .map_err(|e| GeneratorError::Configuration(e.to_string()))
    }

    /// Duration at millisecond resolution
    pub fn duration(&self) -> Result<Duration> {
        let millis = (self.duration_minutes * 60_000.0).round();
        // i64::MAX is not representable; everything at or above it is out of range
        if !(millis.is_finite() && millis >= 0.0 && millis < i64::MAX as f64) {
            return Err(GeneratorError::Configuration(format!(
                "DURATION_MINUTES out of range: {}",
                self.duration_minutes
            )));
        }
        Duration::try_milliseconds(millis as i64).ok_or_else(|| {
            GeneratorError::Configuration(format!(
                "DURATION_MINUTES out of range: {}",
                self.duration_minutes
            ))
        })
    }

    pub fn time_step(&self) -> Result<Duration> {
        i64::try_from(self.time_step_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                GeneratorError::Configuration(format!(
                    "TIME_STEP_SECONDS out of range: {}",
                    self.time_step_seconds
                ))
            })
    }

    pub fn end_time(&self) -> Result<DateTime<Utc>> {
        self.start_time
            .checked_add_signed(self.duration()?)
            .ok_or_else(|| {
                GeneratorError::Configuration(format!(
                    "START_TIME + DURATION_MINUTES is not a representable instant (start {})",
                    self.start_time
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::t0;
    use std::io::Write;

    const SCENARIO: &str = r#"
SCENARIO_NAME: Starlink_V1_Normal
CONSTELLATION: STARLINK
SUBSET_SIZE: 200
INCLUDE_GROUND_NODES: false
GS_LOCATION_FILE: GROUND_STATIONS
OBJECTIVE: SINGLE
START_TIME: "2024-01-01T00:00:00Z"
DURATION_MINUTES: 2
TIME_STEP_SECONDS: 60
"#;

    #[test]
    fn test_parse_scenario() {
        let config = ScenarioConfig::from_yaml_str(SCENARIO).unwrap();

        assert_eq!(config.scenario_name, "Starlink_V1_Normal");
        assert_eq!(config.subset_size, 200);
        assert_eq!(config.objective, Objective::Single);
        assert_eq!(config.start_time, t0());
        assert_eq!(config.end_time().unwrap(), t0() + Duration::seconds(120));
        assert_eq!(config.max_isl_distance_km, 2700.0);
        assert_eq!(config.max_isl_per_sat, 4);
    }

    #[test]
    fn test_multi_objective_and_overrides() {
        let yaml = SCENARIO
            .replace("OBJECTIVE: SINGLE", "OBJECTIVE: MULTI")
            + "MAX_ISL_DISTANCE_KM: 5000\nMAX_ISL_PER_SAT: 2\n";
        let config = ScenarioConfig::from_yaml_str(&yaml).unwrap();

        assert_eq!(config.objective, Objective::Multi);
        let constraints = config.link_constraints().unwrap();
        assert_eq!(constraints.max_distance_km, 5000.0);
        assert_eq!(constraints.max_degree_per_node, 2);
    }

    #[test]
    fn test_rejects_invalid_fields() {
        for (from, to) in [
            ("SUBSET_SIZE: 200", "SUBSET_SIZE: 0"),
            ("TIME_STEP_SECONDS: 60", "TIME_STEP_SECONDS: 0"),
            ("DURATION_MINUTES: 2", "DURATION_MINUTES: -1"),
            ("SCENARIO_NAME: Starlink_V1_Normal", "SCENARIO_NAME: ../escape"),
            ("OBJECTIVE: SINGLE", "OBJECTIVE: PARETO"),
            ("START_TIME: \"2024-01-01T00:00:00Z\"", "START_TIME: yesterday"),
        ] {
            let yaml = SCENARIO.replace(from, to);
            let err = ScenarioConfig::from_yaml_str(&yaml).unwrap_err();
            assert!(err.is_configuration(), "{} accepted: {}", to, err);
        }
    }

    #[test]
    fn test_ground_nodes_require_source() {
        let yaml = SCENARIO
            .replace("INCLUDE_GROUND_NODES: false", "INCLUDE_GROUND_NODES: true")
            .replace("GS_LOCATION_FILE: GROUND_STATIONS\n", "");
        assert!(ScenarioConfig::from_yaml_str(&yaml).is_err());

        let yaml = SCENARIO.replace("INCLUDE_GROUND_NODES: false", "INCLUDE_GROUND_NODES: true");
        assert!(ScenarioConfig::from_yaml_str(&yaml).is_ok());
    }

    #[test]
    fn test_fractional_duration_millisecond_resolution() {
        let yaml = SCENARIO.replace("DURATION_MINUTES: 2", "DURATION_MINUTES: 0.0025");
        let config = ScenarioConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.duration().unwrap(), Duration::milliseconds(150));
    }

    #[test]
    fn test_rejects_unrepresentable_time_ranges() {
        for (from, to) in [
            ("TIME_STEP_SECONDS: 60", "TIME_STEP_SECONDS: 100000000000000000"),
            ("TIME_STEP_SECONDS: 60", "TIME_STEP_SECONDS: 18446744073709551615"),
            ("DURATION_MINUTES: 2", "DURATION_MINUTES: 1.0e300"),
            ("DURATION_MINUTES: 2", "DURATION_MINUTES: 9000000000000"),
        ] {
            let yaml = SCENARIO.replace(from, to);
            let err = ScenarioConfig::from_yaml_str(&yaml).unwrap_err();
            assert!(err.is_configuration(), "{} accepted: {}", to, err);
        }

        let mut config = ScenarioConfig::from_yaml_str(SCENARIO).unwrap();
        config.time_step_seconds = u64::MAX;
        assert!(config.time_step().is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_largest_step_accepted() {
        let yaml = SCENARIO.replace("TIME_STEP_SECONDS: 60", "TIME_STEP_SECONDS: 86400000");
        let config = ScenarioConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.time_step().unwrap(), Duration::days(1000));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCENARIO.as_bytes()).unwrap();

        let config = ScenarioConfig::from_file(file.path()).unwrap();
        assert_eq!(config.constellation, "STARLINK");

        let missing = ScenarioConfig::from_file("/nonexistent/scenario.yaml").unwrap_err();
        assert!(missing.is_configuration());
    }
}
