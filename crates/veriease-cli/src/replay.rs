//! Offline liveness replay over recorded, timestamped observations.
//!
//! The replay clock jumps from frame to frame. Before each frame, any window
//! whose deadline has passed is expired at the deadline itself, which is
//! what a live session timer would have done between frames.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use veriease_core::{FaceObservation, LivenessConfig, LivenessStatus, LivenessTracker};

/// One recorded frame: seconds since the start of capture and the detector output.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordedFrame {
    pub t: f64,
    #[serde(default)]
    pub face: Option<FaceObservation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cause {
    Frame,
    Expired,
}

/// A status change observed during the replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayEvent {
    pub t: f64,
    pub cause: Cause,
    #[serde(flatten)]
    pub status: LivenessStatus,
}

#[derive(Debug, Clone)]
pub struct ReplaySummary {
    pub frames: usize,
    pub events: Vec<ReplayEvent>,
    pub final_status: LivenessStatus,
    /// First time the subject was judged live.
    pub detected_at: Option<f64>,
}

/// Replay `frames` in order, then let the clock run to `until` if given.
pub fn replay(config: LivenessConfig, frames: &[RecordedFrame], until: Option<f64>) -> Result<ReplaySummary> {
    let mut tracker = LivenessTracker::new(config);
    let base = Instant::now();
    let mut last_t = 0.0f64;
    let mut status = tracker.status();
    let mut events = Vec::new();
    let mut detected_at = None;

    for frame in frames {
        if !frame.t.is_finite() || frame.t < last_t {
            bail!("frame timestamps must be finite and non-decreasing (got {} after {})", frame.t, last_t);
        }
        last_t = frame.t;
        let now = clock_at(base, frame.t)?;

        if let Some(event) = expire_before(&mut tracker, base, now, &mut status) {
            events.push(event);
        }

        tracker.on_frame(frame.face.as_ref(), now);
        if tracker.status() != status {
            status = tracker.status();
            if status.is_detected && detected_at.is_none() {
                detected_at = Some(frame.t);
            }
            events.push(ReplayEvent {
                t: frame.t,
                cause: Cause::Frame,
                status,
            });
        }
    }

    if let Some(until) = until {
        if !until.is_finite() || until < last_t {
            bail!("--until must be at or after the last frame ({last_t}s)");
        }
        let now = clock_at(base, until)?;
        if let Some(event) = expire_before(&mut tracker, base, now, &mut status) {
            events.push(event);
        }
    }

    Ok(ReplaySummary {
        frames: frames.len(),
        events,
        final_status: tracker.status(),
        detected_at,
    })
}

/// Replay clock reading `t` seconds after `base`.
fn clock_at(base: Instant, t: f64) -> Result<Instant> {
    let offset = Duration::try_from_secs_f64(t)
        .with_context(|| format!("timestamp {t}s is not representable"))?;
    base.checked_add(offset)
        .with_context(|| format!("timestamp {t}s overflows the replay clock"))
}

fn expire_before(
    tracker: &mut LivenessTracker,
    base: Instant,
    now: Instant,
    status: &mut LivenessStatus,
) -> Option<ReplayEvent> {
    let deadline = tracker.deadline()?;
    if now < deadline || !tracker.expire(deadline) {
        return None;
    }
    *status = tracker.status();
    Some(ReplayEvent {
        t: deadline.duration_since(base).as_secs_f64(),
        cause: Cause::Expired,
        status: *status,
    })
}
