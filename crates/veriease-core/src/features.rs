//! Per-frame movement features: eye aspect ratio and head yaw.

use serde::Serialize;

use crate::config::LivenessConfig;
use crate::geometry::distance;
use crate::observation::{FaceObservation, LandmarkRegion, RegionName};

/// Eye regions with fewer points than this cannot produce an EAR.
pub const MIN_EYE_POINTS: usize = 6;

/// EAR reported for an eye that is missing or under-sampled. Never reads as closed.
pub const NEUTRAL_EAR: f32 = 1.0;

/// Eye aspect ratio: `(|p1 - p5| + |p2 - p4|) / (2 |p0 - p3|)`.
///
/// Returns [`NEUTRAL_EAR`] for a missing region or one with fewer than
/// [`MIN_EYE_POINTS`] points. A zero-width eye returns 0.0 when the lids
/// also coincide and [`NEUTRAL_EAR`] otherwise, so the result is always finite.
pub fn eye_aspect_ratio(eye: Option<&LandmarkRegion>) -> f32 {
    let Some(eye) = eye else {
        return NEUTRAL_EAR;
    };
    if eye.len() < MIN_EYE_POINTS {
        return NEUTRAL_EAR;
    }
    let p = &eye.points;
    let vertical = distance(p[1], p[5]) + distance(p[2], p[4]);
    let horizontal = distance(p[0], p[3]);
    if horizontal == 0.0 {
        return if vertical == 0.0 { 0.0 } else { NEUTRAL_EAR };
    }
    vertical / (2.0 * horizontal)
}

/// Movement evidence extracted from a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MovementSignals {
    pub left_ear: f32,
    pub right_ear: f32,
    /// Yaw used for the tilt decision; 0.0 when the detector reported none.
    pub yaw: f32,
    pub blink: bool,
    pub tilt: bool,
}

impl MovementSignals {
    pub fn extract(observation: &FaceObservation, config: &LivenessConfig) -> Self {
        let left_ear = eye_aspect_ratio(observation.region(RegionName::LeftEye));
        let right_ear = eye_aspect_ratio(observation.region(RegionName::RightEye));
        let yaw = observation.yaw.unwrap_or(0.0);

        Self {
            left_ear,
            right_ear,
            yaw,
            blink: left_ear < config.blink_ear_threshold || right_ear < config.blink_ear_threshold,
            tilt: yaw.abs() > config.tilt_yaw_threshold,
        }
    }

    pub fn is_movement(&self) -> bool {
        self.blink || self.tilt
    }
}
