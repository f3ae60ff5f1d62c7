//! Face observations as produced by the external landmark detector.
//!
//! The detector itself (camera frame or still image in, landmarks out) lives
//! outside this crate. Everything here is the shape of its output: named
//! landmark regions made of normalized points, plus an optional head yaw.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::Point;

/// Anatomical landmark regions reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegionName {
    LeftEye,
    RightEye,
    LeftEyebrow,
    RightEyebrow,
    Nose,
    OuterLips,
    InnerLips,
    LeftPupil,
    RightPupil,
    FaceContour,
}

impl RegionName {
    pub const ALL: [RegionName; 10] = [
        RegionName::LeftEye,
        RegionName::RightEye,
        RegionName::LeftEyebrow,
        RegionName::RightEyebrow,
        RegionName::Nose,
        RegionName::OuterLips,
        RegionName::InnerLips,
        RegionName::LeftPupil,
        RegionName::RightPupil,
        RegionName::FaceContour,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RegionName::LeftEye => "leftEye",
            RegionName::RightEye => "rightEye",
            RegionName::LeftEyebrow => "leftEyebrow",
            RegionName::RightEyebrow => "rightEyebrow",
            RegionName::Nose => "nose",
            RegionName::OuterLips => "outerLips",
            RegionName::InnerLips => "innerLips",
            RegionName::LeftPupil => "leftPupil",
            RegionName::RightPupil => "rightPupil",
            RegionName::FaceContour => "faceContour",
        }
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered points outlining one region.
///
/// Point order is anatomical and fixed by the detector. For eyes, indices
/// 0 and 3 are the horizontal corners, 1/5 and 2/4 the upper/lower lid pairs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkRegion {
    pub points: Vec<Point>,
}

impl LandmarkRegion {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl From<Vec<Point>> for LandmarkRegion {
    fn from(points: Vec<Point>) -> Self {
        Self { points }
    }
}

impl FromIterator<(f32, f32)> for LandmarkRegion {
    fn from_iter<I: IntoIterator<Item = (f32, f32)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().map(|(x, y)| Point::new(x, y)).collect(),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ObservationError {
    #[error("non-finite coordinate in region {region} at index {index}")]
    NonFinitePoint { region: RegionName, index: usize },
    #[error("coordinate ({x}, {y}) in region {region} at index {index} is outside [0, 1]")]
    OutOfRange {
        region: RegionName,
        index: usize,
        x: f32,
        y: f32,
    },
    #[error("yaw is not a finite angle: {0}")]
    NonFiniteYaw(f32),
}

/// One detected face: landmark regions and head yaw in radians.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceObservation {
    #[serde(default)]
    pub landmarks: BTreeMap<RegionName, LandmarkRegion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f32>,
}

impl FaceObservation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, name: RegionName, region: impl Into<LandmarkRegion>) -> Self {
        self.landmarks.insert(name, region.into());
        self
    }

    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.yaw = Some(yaw);
        self
    }

    pub fn region(&self, name: RegionName) -> Option<&LandmarkRegion> {
        self.landmarks.get(&name)
    }

    /// Check that every coordinate is finite and normalized.
    ///
    /// Only loaders at the process boundary call this. The feature and
    /// matching code accepts any well-typed observation.
    pub fn validate(&self) -> Result<(), ObservationError> {
        for (&region, landmarks) in &self.landmarks {
            for (index, p) in landmarks.points.iter().enumerate() {
                if !p.x.is_finite() || !p.y.is_finite() {
                    return Err(ObservationError::NonFinitePoint { region, index });
                }
                if !(0.0..=1.0).contains(&p.x) || !(0.0..=1.0).contains(&p.y) {
                    return Err(ObservationError::OutOfRange {
                        region,
                        index,
                        x: p.x,
                        y: p.y,
                    });
                }
            }
        }
        match self.yaw {
            Some(yaw) if !yaw.is_finite() => Err(ObservationError::NonFiniteYaw(yaw)),
            _ => Ok(()),
        }
    }
}
