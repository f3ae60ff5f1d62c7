//! JSON loaders for observations exported by the landmark detector.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use veriease_core::FaceObservation;

/// Load an observation file. JSON `null` means the detector found no face.
pub fn load_observation(path: &Path) -> Result<Option<FaceObservation>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_observation(&contents).with_context(|| format!("invalid observation in {}", path.display()))
}

/// Load an observation file that must contain a face.
pub fn load_face(path: &Path) -> Result<FaceObservation> {
    match load_observation(path)? {
        Some(face) => Ok(face),
        None => bail!("{} contains no face", path.display()),
    }
}

pub fn parse_observation(json: &str) -> Result<Option<FaceObservation>> {
    let observation: Option<FaceObservation> = serde_json::from_str(json)?;
    if let Some(observation) = &observation {
        observation.validate()?;
    }
    Ok(observation)
}
