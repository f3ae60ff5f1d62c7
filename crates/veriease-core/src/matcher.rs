//! Landmark-based comparison of a reference photo against a live capture.
//!
//! Both observations come from an aligned landmark detector in normalized
//! coordinates, so corresponding regions of the same face land on nearly the
//! same points. A region matches when its points stay within tolerance; the
//! face matches when enough regions do. Two policies are available, see
//! [`MatchPolicy`]. They are not equivalent and accept different rates.

use serde::Serialize;

use crate::config::{MatchPolicy, MatcherConfig};
use crate::geometry::distance;
use crate::glasses::GlassesHeuristic;
use crate::observation::{FaceObservation, LandmarkRegion, RegionName};

/// Regions compared under [`MatchPolicy::RegionAverage`].
pub const AVERAGE_POLICY_REGIONS: [RegionName; 8] = [
    RegionName::Nose,
    RegionName::LeftEye,
    RegionName::RightEye,
    RegionName::OuterLips,
    RegionName::InnerLips,
    RegionName::LeftPupil,
    RegionName::RightPupil,
    RegionName::FaceContour,
];

/// Regions that must all pass under [`MatchPolicy::StrictPerAxis`].
pub const STRICT_POLICY_REGIONS: [RegionName; 5] = [
    RegionName::Nose,
    RegionName::LeftEye,
    RegionName::RightEye,
    RegionName::LeftPupil,
    RegionName::RightPupil,
];

/// Final outcome of one comparison request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchVerdict {
    Match,
    NoMatch,
    /// No match, and the live capture shows glasses the reference does not.
    NoMatchExplainedByGlasses,
    NoFaceInReference,
    NoFaceInLive,
}

impl MatchVerdict {
    pub fn is_match(self) -> bool {
        self == MatchVerdict::Match
    }

    /// Detection failed upstream; no comparison was made.
    pub fn is_error(self) -> bool {
        matches!(self, MatchVerdict::NoFaceInReference | MatchVerdict::NoFaceInLive)
    }

    /// User-facing copy.
    pub fn message(self) -> &'static str {
        match self {
            MatchVerdict::Match => "Faces match",
            MatchVerdict::NoMatch => "Faces do not match",
            MatchVerdict::NoMatchExplainedByGlasses => {
                "Faces do not match. Please remove glasses and try again."
            }
            MatchVerdict::NoFaceInReference => "No face detected in reference image",
            MatchVerdict::NoFaceInLive => "No face detected in live photo",
        }
    }
}

/// Per-region comparison detail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegionOutcome {
    pub region: RegionName,
    pub matched: bool,
    /// Mean point distance; `None` when the region is missing or point counts differ.
    pub average_distance: Option<f32>,
}

/// Comparison detail behind a match decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchReport {
    pub regions: Vec<RegionOutcome>,
    pub matched_count: usize,
    pub required_count: usize,
    pub is_match: bool,
}

/// Regions needed to pass: `fraction * count`, truncated toward zero.
pub fn required_regions(count: usize, fraction: f32) -> usize {
    (fraction * count as f32) as usize
}

/// Mean distance between index-paired points. `None` on unequal or zero counts.
pub fn average_point_distance(a: &LandmarkRegion, b: &LandmarkRegion) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let total: f32 = a
        .points
        .iter()
        .zip(&b.points)
        .map(|(p, q)| distance(*p, *q))
        .sum();
    Some(total / a.len() as f32)
}

/// Largest per-axis offset between index-paired points. `None` on unequal or zero counts.
pub fn max_axis_offset(a: &LandmarkRegion, b: &LandmarkRegion) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    Some(
        a.points
            .iter()
            .zip(&b.points)
            .map(|(p, q)| (p.x - q.x).abs().max((p.y - q.y).abs()))
            .fold(0.0f32, f32::max),
    )
}

/// Landmark matcher that falls back to a glasses check on mismatch.
pub struct FaceMatcher {
    config: MatcherConfig,
    glasses: GlassesHeuristic,
}

impl FaceMatcher {
    pub fn new(config: MatcherConfig, glasses: GlassesHeuristic) -> Self {
        Self { config, glasses }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.config.policy
    }

    /// Compare region by region under the configured policy.
    pub fn evaluate(&self, reference: &FaceObservation, live: &FaceObservation) -> MatchReport {
        match self.config.policy {
            MatchPolicy::RegionAverage {
                tolerance,
                required_fraction,
            } => {
                let regions: Vec<RegionOutcome> = AVERAGE_POLICY_REGIONS
                    .iter()
                    .map(|&region| {
                        let average_distance = pair(reference, live, region)
                            .and_then(|(a, b)| average_point_distance(a, b));
                        RegionOutcome {
                            region,
                            matched: average_distance.is_some_and(|d| d <= tolerance),
                            average_distance,
                        }
                    })
                    .collect();
                let required_count = required_regions(regions.len(), required_fraction);
                build_report(regions, required_count)
            }
            MatchPolicy::StrictPerAxis { tolerance } => {
                let regions: Vec<RegionOutcome> = STRICT_POLICY_REGIONS
                    .iter()
                    .map(|&region| {
                        let paired = pair(reference, live, region);
                        let offset = paired.and_then(|(a, b)| max_axis_offset(a, b));
                        RegionOutcome {
                            region,
                            matched: offset.is_some_and(|o| o <= tolerance),
                            average_distance: paired.and_then(|(a, b)| average_point_distance(a, b)),
                        }
                    })
                    .collect();
                let required_count = regions.len();
                build_report(regions, required_count)
            }
        }
    }

    /// Decide match / no-match, running the glasses check only on a mismatch.
    pub fn compare(&self, reference: &FaceObservation, live: &FaceObservation) -> MatchVerdict {
        let report = self.evaluate(reference, live);
        tracing::debug!(
            matched = report.matched_count,
            required = report.required_count,
            is_match = report.is_match,
            "matcher: regions compared"
        );
        if report.is_match {
            return MatchVerdict::Match;
        }

        let reference_glasses = self.glasses.detect(reference);
        let live_glasses = self.glasses.detect(live);
        if !reference_glasses.has_glasses && live_glasses.has_glasses {
            tracing::info!(
                live_confidence = live_glasses.confidence,
                "matcher: mismatch with glasses only in live capture"
            );
            MatchVerdict::NoMatchExplainedByGlasses
        } else {
            MatchVerdict::NoMatch
        }
    }

    /// Compare observations that may be missing because detection failed.
    ///
    /// The reference is checked first.
    pub fn verify(
        &self,
        reference: Option<&FaceObservation>,
        live: Option<&FaceObservation>,
    ) -> MatchVerdict {
        match (reference, live) {
            (None, _) => {
                tracing::warn!("matcher: no face in reference image");
                MatchVerdict::NoFaceInReference
            }
            (Some(_), None) => {
                tracing::warn!("matcher: no face in live image");
                MatchVerdict::NoFaceInLive
            }
            (Some(reference), Some(live)) => self.compare(reference, live),
        }
    }
}

fn pair<'a>(
    reference: &'a FaceObservation,
    live: &'a FaceObservation,
    region: RegionName,
) -> Option<(&'a LandmarkRegion, &'a LandmarkRegion)> {
    Some((reference.region(region)?, live.region(region)?))
}

fn build_report(regions: Vec<RegionOutcome>, required_count: usize) -> MatchReport {
    let matched_count = regions.iter().filter(|r| r.matched).count();
    MatchReport {
        is_match: matched_count >= required_count,
        regions,
        matched_count,
        required_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlassesConfig;
    use crate::geometry::Point;

    fn region(x: f32, y: f32) -> LandmarkRegion {
        LandmarkRegion::new(vec![
            Point::new(x, y),
            Point::new(x + 0.02, y),
            Point::new(x + 0.02, y + 0.02),
            Point::new(x, y + 0.02),
        ])
    }

    fn shifted(r: &LandmarkRegion, dx: f32, dy: f32) -> LandmarkRegion {
        r.points
            .iter()
            .map(|p| (p.x + dx, p.y + dy))
            .collect()
    }

    fn full_face() -> FaceObservation {
        let mut obs = FaceObservation::new();
        for (i, name) in RegionName::ALL.iter().enumerate() {
            obs = obs.with_region(*name, region(0.1 + i as f32 * 0.07, 0.3));
        }
        obs
    }

    /// Copy of `base` with the first `n` average-policy regions moved by `d` on x.
    fn with_moved(base: &FaceObservation, n: usize, d: f32) -> FaceObservation {
        let mut obs = base.clone();
        for name in AVERAGE_POLICY_REGIONS.iter().take(n) {
            let moved = shifted(base.region(*name).unwrap(), d, 0.0);
            obs.landmarks.insert(*name, moved);
        }
        obs
    }

    fn matcher(policy: MatchPolicy) -> FaceMatcher {
        FaceMatcher::new(MatcherConfig { policy }, GlassesHeuristic::new(GlassesConfig::default()))
    }

    #[test]
    fn test_required_regions_truncates() {
        assert_eq!(required_regions(8, 0.75), 6);
        assert_eq!(required_regions(5, 0.75), 3);
        assert_eq!(required_regions(7, 0.75), 5);
    }

    #[test]
    fn test_average_distance_unequal_counts() {
        let a = region(0.1, 0.1);
        let mut b = region(0.1, 0.1);
        b.points.pop();
        assert!(average_point_distance(&a, &b).is_none());
        assert!(max_axis_offset(&a, &b).is_none());
    }

    #[test]
    fn test_identical_faces_match() {
        let face = full_face();
        let m = matcher(MatchPolicy::region_average());
        let report = m.evaluate(&face, &face);
        assert_eq!(report.matched_count, 8);
        assert_eq!(report.required_count, 6);
        assert_eq!(m.compare(&face, &face), MatchVerdict::Match);
    }

    #[test]
    fn test_every_region_far_is_no_match() {
        let face = full_face();
        let other = with_moved(&face, 8, 0.1);
        let m = matcher(MatchPolicy::region_average());
        assert_eq!(m.evaluate(&face, &other).matched_count, 0);
        assert_eq!(m.compare(&face, &other), MatchVerdict::NoMatch);
    }

    #[test]
    fn test_six_of_eight_matches() {
        let face = full_face();
        let other = with_moved(&face, 2, 0.1);
        let report = matcher(MatchPolicy::region_average()).evaluate(&face, &other);
        assert_eq!(report.matched_count, 6);
        assert!(report.is_match);
    }

    #[test]
    fn test_five_of_eight_does_not_match() {
        let face = full_face();
        let other = with_moved(&face, 3, 0.1);
        let report = matcher(MatchPolicy::region_average()).evaluate(&face, &other);
        assert_eq!(report.matched_count, 5);
        assert!(!report.is_match);
    }

    #[test]
    fn test_small_offset_within_tolerance() {
        let face = full_face();
        let other = with_moved(&face, 8, 0.03);
        assert!(matcher(MatchPolicy::region_average()).evaluate(&face, &other).is_match);
    }

    #[test]
    fn test_missing_regions_count_as_mismatch() {
        let face = full_face();
        let mut other = face.clone();
        other.landmarks.remove(&RegionName::Nose);
        other.landmarks.remove(&RegionName::InnerLips);
        other.landmarks.remove(&RegionName::FaceContour);
        let report = matcher(MatchPolicy::region_average()).evaluate(&face, &other);
        assert_eq!(report.matched_count, 5);
        let nose = report.regions.iter().find(|r| r.region == RegionName::Nose).unwrap();
        assert!(!nose.matched);
        assert!(nose.average_distance.is_none());
    }

    #[test]
    fn test_strict_policy_requires_all_five() {
        let face = full_face();
        let m = matcher(MatchPolicy::strict_per_axis());
        assert_eq!(m.compare(&face, &face), MatchVerdict::Match);

        // Lips and contour are ignored by the strict policy.
        let mut lips_moved = face.clone();
        for name in [RegionName::OuterLips, RegionName::InnerLips, RegionName::FaceContour] {
            lips_moved
                .landmarks
                .insert(name, shifted(face.region(name).unwrap(), 0.3, 0.0));
        }
        assert!(m.evaluate(&face, &lips_moved).is_match);

        // One pupil point off by more than the axis tolerance fails.
        let mut pupil_moved = face.clone();
        let mut pupil = face.region(RegionName::LeftPupil).unwrap().clone();
        pupil.points[0].y += 0.06;
        pupil_moved.landmarks.insert(RegionName::LeftPupil, pupil);
        let report = m.evaluate(&face, &pupil_moved);
        assert_eq!(report.required_count, 5);
        assert_eq!(report.matched_count, 4);
        assert!(!report.is_match);
    }

    #[test]
    fn test_policies_disagree_on_single_outlier_point() {
        // One point moved 0.06 on y: mean distance 0.015 passes, per-axis 0.05 fails.
        let face = full_face();
        let mut other = face.clone();
        let mut nose = face.region(RegionName::Nose).unwrap().clone();
        nose.points[0].y += 0.06;
        other.landmarks.insert(RegionName::Nose, nose);

        assert!(matcher(MatchPolicy::region_average()).evaluate(&face, &other).is_match);
        assert!(!matcher(MatchPolicy::strict_per_axis()).evaluate(&face, &other).is_match);
    }

    #[test]
    fn test_mismatch_explained_by_glasses() {
        let reference = crate::glasses::tests::face(0.1, 0.01);
        let live = crate::glasses::tests::face(0.45, 0.2);
        let m = matcher(MatchPolicy::region_average());
        assert_eq!(m.compare(&reference, &live), MatchVerdict::NoMatchExplainedByGlasses);
        // Glasses in both images do not explain anything.
        assert_eq!(m.compare(&live, &live.clone().with_yaw(0.1)), MatchVerdict::NoMatch);
    }

    #[test]
    fn test_live_without_landmarks_is_plain_no_match() {
        let reference = crate::glasses::tests::face(0.1, 0.01);
        let m = matcher(MatchPolicy::region_average());
        assert_eq!(m.compare(&reference, &FaceObservation::new()), MatchVerdict::NoMatch);
    }

    #[test]
    fn test_verify_missing_faces() {
        let face = full_face();
        let m = matcher(MatchPolicy::region_average());
        assert_eq!(m.verify(None, Some(&face)), MatchVerdict::NoFaceInReference);
        assert_eq!(m.verify(None, None), MatchVerdict::NoFaceInReference);
        assert_eq!(m.verify(Some(&face), None), MatchVerdict::NoFaceInLive);
        assert_eq!(m.verify(Some(&face), Some(&face)), MatchVerdict::Match);
    }

    #[test]
    fn test_verdict_helpers() {
        assert!(MatchVerdict::Match.is_match());
        assert!(!MatchVerdict::NoMatchExplainedByGlasses.is_match());
        assert!(MatchVerdict::NoFaceInLive.is_error());
        assert!(!MatchVerdict::NoMatch.is_error());
        assert!(MatchVerdict::NoMatchExplainedByGlasses.message().contains("glasses"));
        assert_eq!(
            serde_json::to_string(&MatchVerdict::NoFaceInReference).unwrap(),
            "\"no_face_in_reference\""
        );
    }
}
