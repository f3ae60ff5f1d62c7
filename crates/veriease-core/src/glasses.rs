//! Eyeglasses presence estimated from landmark geometry.
//!
//! No texture or edge classifier runs here. Frames push the eyebrows away
//! from the eyes and sit wider than the eye corners, so both distances are
//! used as proxies. A brightness-distribution signal has a slot in the
//! fusion but is supplied from outside (a placeholder constant by default).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{GlassesConfig, GlassesPolicy};
use crate::geometry::{centroid, distance, normalize};
use crate::observation::{FaceObservation, LandmarkRegion, RegionName};

/// Signals that may contribute to a glasses decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GlassesSignal {
    EyeBrowGeometry,
    FrameWidth,
    Brightness,
}

/// Outcome of one glasses check. `details` is diagnostic only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlassesDetectionResult {
    pub has_glasses: bool,
    pub confidence: f32,
    pub details: BTreeMap<GlassesSignal, f32>,
}

impl GlassesDetectionResult {
    fn none() -> Self {
        Self {
            has_glasses: false,
            confidence: 0.0,
            details: BTreeMap::new(),
        }
    }
}

/// Landmark-geometry glasses detector configured by [`GlassesConfig`].
#[derive(Debug, Clone, Default)]
pub struct GlassesHeuristic {
    config: GlassesConfig,
}

impl GlassesHeuristic {
    pub fn new(config: GlassesConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GlassesConfig {
        &self.config
    }

    /// Detect using the configured brightness placeholder.
    pub fn detect(&self, observation: &FaceObservation) -> GlassesDetectionResult {
        self.detect_with_brightness(observation, self.config.brightness_signal())
    }

    /// Detect with an externally measured brightness score in `[0, 1]`.
    ///
    /// A face without landmarks never reports glasses, whatever the brightness.
    pub fn detect_with_brightness(
        &self,
        observation: &FaceObservation,
        brightness: Option<f32>,
    ) -> GlassesDetectionResult {
        if observation.landmarks.is_empty() {
            tracing::debug!("glasses: no landmarks");
            return GlassesDetectionResult::none();
        }
        let result = match self.config.policy {
            GlassesPolicy::WeightedSignals => self.weighted(observation, brightness),
            GlassesPolicy::InterEyeWidth => self.inter_eye_width(observation),
        };
        tracing::debug!(
            has_glasses = result.has_glasses,
            confidence = result.confidence,
            signals = result.details.len(),
            "glasses: evaluated"
        );
        result
    }

    fn weighted(&self, observation: &FaceObservation, brightness: Option<f32>) -> GlassesDetectionResult {
        let candidates = [
            (GlassesSignal::EyeBrowGeometry, self.eye_brow_geometry_score(observation)),
            (GlassesSignal::FrameWidth, self.frame_width_score(observation)),
            (GlassesSignal::Brightness, brightness.map(|b| b.clamp(0.0, 1.0))),
        ];

        let mut details = BTreeMap::new();
        let mut scores = Vec::with_capacity(candidates.len());
        for (signal, score) in candidates {
            if let Some(score) = score {
                details.insert(signal, score);
                scores.push(score);
            }
        }

        let confidence = fuse_scores(&scores, &self.config.weights);
        GlassesDetectionResult {
            has_glasses: confidence >= self.config.min_confidence,
            confidence,
            details,
        }
    }

    fn inter_eye_width(&self, observation: &FaceObservation) -> GlassesDetectionResult {
        let Some(width) = inter_eye_width(observation) else {
            return GlassesDetectionResult::none();
        };
        let mut details = BTreeMap::new();
        let range = self.config.frame_width_range;
        let confidence = normalize(width, range.min, range.max);
        details.insert(GlassesSignal::FrameWidth, confidence);
        GlassesDetectionResult {
            has_glasses: width >= self.config.frame_width_ratio,
            confidence,
            details,
        }
    }

    /// Mean eye-to-eyebrow centroid distance, normalized. Needs both eyes and brows.
    pub fn eye_brow_geometry_score(&self, observation: &FaceObservation) -> Option<f32> {
        let left = eye_brow_distance(
            observation.region(RegionName::LeftEye)?,
            observation.region(RegionName::LeftEyebrow)?,
        )?;
        let right = eye_brow_distance(
            observation.region(RegionName::RightEye)?,
            observation.region(RegionName::RightEyebrow)?,
        )?;
        let range = self.config.geometry_range;
        Some(normalize((left + right) / 2.0, range.min, range.max))
    }

    /// Inter-eye width, normalized. Needs both eyes.
    pub fn frame_width_score(&self, observation: &FaceObservation) -> Option<f32> {
        let range = self.config.frame_width_range;
        inter_eye_width(observation).map(|w| normalize(w, range.min, range.max))
    }
}

fn eye_brow_distance(eye: &LandmarkRegion, brow: &LandmarkRegion) -> Option<f32> {
    Some(distance(centroid(&eye.points)?, centroid(&brow.points)?))
}

/// Horizontal distance between the first point of each eye region.
fn inter_eye_width(observation: &FaceObservation) -> Option<f32> {
    let left = observation.region(RegionName::LeftEye)?.points.first()?;
    let right = observation.region(RegionName::RightEye)?.points.first()?;
    Some((right.x - left.x).abs())
}

/// Weighted mean of the present scores, weights applied by position.
///
/// Scores beyond the weight list are ignored. Returns 0.0 when nothing
/// contributes.
pub fn fuse_scores(scores: &[f32], weights: &[f32]) -> f32 {
    let (weighted_sum, weight_sum) = scores
        .iter()
        .zip(weights)
        .fold((0.0f32, 0.0f32), |(ws, w), (score, weight)| {
            (ws + score * weight, w + weight)
        });
    if weight_sum > 0.0 {
        weighted_sum / weight_sum
    } else {
        0.0
    }
}
