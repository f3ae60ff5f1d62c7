//! VeriEase core: liveness tracking and landmark face matching.
//!
//! Consumes face observations produced by an external landmark detector
//! (normalized 2D points per anatomical region, optional head yaw) and
//! answers three questions:
//!
//! 1. Is the subject in front of the camera live? ([`LivenessTracker`])
//! 2. Does the live capture show the same face as the reference document? ([`FaceMatcher`])
//! 3. If not, do glasses in the live capture plausibly explain it? ([`GlassesHeuristic`])
//!
//! Everything here is synchronous and performs no I/O apart from
//! [`EngineConfig::load`]. The matcher and glasses heuristic are pure; the
//! liveness tracker takes its clock as an argument so the caller owns timing.

pub mod config;
pub mod features;
pub mod geometry;
pub mod glasses;
pub mod liveness;
pub mod matcher;
pub mod observation;

pub use config::{
    ConfigError, EngineConfig, GlassesConfig, GlassesPolicy, LivenessConfig, MatchPolicy,
    MatcherConfig,
};
pub use features::{eye_aspect_ratio, MovementSignals};
pub use geometry::{centroid, distance, normalize, Point};
pub use glasses::{GlassesDetectionResult, GlassesHeuristic, GlassesSignal};
pub use liveness::{FrameOutcome, LivenessPhase, LivenessStatus, LivenessTracker, Transition};
pub use matcher::{FaceMatcher, MatchReport, MatchVerdict, RegionOutcome};
pub use observation::{FaceObservation, LandmarkRegion, ObservationError, RegionName};

impl EngineConfig {
    /// Matcher wired with a glasses heuristic from the same configuration.
    pub fn face_matcher(&self) -> FaceMatcher {
        FaceMatcher::new(self.matcher, self.glasses_heuristic())
    }

    pub fn glasses_heuristic(&self) -> GlassesHeuristic {
        GlassesHeuristic::new(self.glasses.clone())
    }
}
