//! Element-set loading from an explicitly named file
//!
//! `.json` files are CelesTrak OMM arrays; anything else is read as TLE text
//! (two- or three-line). No directory scanning.

use crate::{GeneratorError, Result};
use orbital_mechanics::{parse_tle_text, LoadReport, OrbitalError, OrbitalStateProvider, RawElementSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Read raw element sets from `path`
pub fn read_element_file(path: impl AsRef<Path>) -> Result<Vec<RawElementSet>> {
    let path = path.as_ref();
    info!("Loading element sets from {:?}", path);

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let raw = if is_json {
        let file = File::open(path)?;
        let records: Vec<serde_json::Value> = serde_json::from_reader(BufReader::new(file))?;
        records.into_iter().map(RawElementSet::Omm).collect()
    } else {
        parse_tle_text(&std::fs::read_to_string(path)?)
    };

    info!("Read {} raw element sets", raw.len());
    Ok(raw)
}

/// Load a provider from an element file. A file that yields no usable
/// element set is a configuration error.
pub fn load_provider(path: impl AsRef<Path>) -> Result<(OrbitalStateProvider, LoadReport)> {
    let path = path.as_ref();
    let raw = read_element_file(path).map_err(|e| {
        GeneratorError::Configuration(format!("cannot read element file {:?}: {}", path, e))
    })?;

    OrbitalStateProvider::load(raw).map_err(|e| match e {
        OrbitalError::NoUsableElements { skipped } => GeneratorError::Configuration(format!(
            "no usable element sets in {:?} ({} skipped)",
            path, skipped
        )),
        other => other.into(),
    })
}
