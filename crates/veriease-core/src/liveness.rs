//! Active liveness detection via counted voluntary movements.
//!
//! A printed photo or a still frame held up to the camera does not blink and
//! does not turn. The subject is asked to blink or tilt their head; every
//! frame showing either counts as one movement. Reaching the required count
//! inside one window, opened by the first movement, marks the session live.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Printed photographs, static screens.
//! - **Does not block:** Video replay of someone blinking, masks with cut-out eyes.
//!
//! Frames are not debounced: one slow blink spanning three frames counts three
//! times. The tracker is a plain state machine with an injected clock; the
//! window expiry is driven from outside through [`LivenessTracker::deadline`]
//! and [`LivenessTracker::expire`], so a scheduler can fire it even when no
//! further frames arrive.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::LivenessConfig;
use crate::features::MovementSignals;
use crate::observation::FaceObservation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessPhase {
    /// No window open, no movements counted.
    Idle,
    /// Window open, fewer movements than required.
    Tracking,
    /// Required movements reached.
    Satisfied,
}

/// Snapshot published to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LivenessStatus {
    pub phase: LivenessPhase,
    pub movement_count: u32,
    pub is_detected: bool,
}

impl Default for LivenessStatus {
    fn default() -> Self {
        Self {
            phase: LivenessPhase::Idle,
            movement_count: 0,
            is_detected: false,
        }
    }
}

/// Why the tracker state changed on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First movement opened a window.
    WindowOpened,
    /// Another movement inside the open window.
    Counted,
    /// The required count was reached.
    Satisfied,
    /// No face in the frame.
    FaceLost,
}

/// Result of feeding one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameOutcome {
    /// Signals for the frame, `None` when no face was present.
    pub signals: Option<MovementSignals>,
    pub transition: Option<Transition>,
    pub status: LivenessStatus,
}

/// Counts movements per window and reports when the subject is live.
pub struct LivenessTracker {
    config: LivenessConfig,
    movement_count: u32,
    window_start: Option<Instant>,
    is_detected: bool,
}

impl LivenessTracker {
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            config,
            movement_count: 0,
            window_start: None,
            is_detected: false,
        }
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    pub fn required_movements(&self) -> u32 {
        self.config.required_movements
    }

    pub fn movement_interval(&self) -> Duration {
        self.config.movement_interval()
    }

    pub fn movement_count(&self) -> u32 {
        self.movement_count
    }

    pub fn is_detected(&self) -> bool {
        self.is_detected
    }

    pub fn phase(&self) -> LivenessPhase {
        if self.is_detected {
            LivenessPhase::Satisfied
        } else if self.window_start.is_some() {
            LivenessPhase::Tracking
        } else {
            LivenessPhase::Idle
        }
    }

    pub fn status(&self) -> LivenessStatus {
        LivenessStatus {
            phase: self.phase(),
            movement_count: self.movement_count,
            is_detected: self.is_detected,
        }
    }

    /// When the open window expires. `Some` only while tracking.
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase() {
            LivenessPhase::Tracking => self
                .window_start
                .map(|start| start + self.config.movement_interval()),
            _ => None,
        }
    }

    /// Feed one frame. `None` means the detector found no face.
    pub fn on_frame(&mut self, observation: Option<&FaceObservation>, now: Instant) -> FrameOutcome {
        let Some(observation) = observation else {
            let transition = (self.status() != LivenessStatus::default()).then_some(Transition::FaceLost);
            if transition.is_some() {
                tracing::debug!(count = self.movement_count, "liveness: face lost, resetting");
            }
            self.reset();
            return FrameOutcome {
                signals: None,
                transition,
                status: self.status(),
            };
        };

        // A frame at or past the deadline never lands in the stale window,
        // whichever of frame and timer the scheduler delivers first.
        self.expire(now);

        let signals = MovementSignals::extract(observation, &self.config);
        let transition = if signals.is_movement() {
            Some(self.track_movement(now))
        } else {
            None
        };

        FrameOutcome {
            signals: Some(signals),
            transition,
            status: self.status(),
        }
    }

    fn track_movement(&mut self, now: Instant) -> Transition {
        let opened = match self.phase() {
            LivenessPhase::Idle => {
                self.window_start = Some(now);
                true
            }
            LivenessPhase::Tracking | LivenessPhase::Satisfied => false,
        };

        self.movement_count = self.movement_count.saturating_add(1);

        if self.is_detected {
            return Transition::Counted;
        }

        if self.movement_count >= self.config.required_movements {
            self.is_detected = true;
            self.window_start = None;
            tracing::info!(
                count = self.movement_count,
                required = self.config.required_movements,
                "liveness: movement threshold reached"
            );
            return Transition::Satisfied;
        }

        if opened {
            tracing::debug!(
                interval_ms = self.config.movement_interval().as_millis() as u64,
                "liveness: movement window opened"
            );
            Transition::WindowOpened
        } else {
            tracing::debug!(count = self.movement_count, "liveness: movement counted");
            Transition::Counted
        }
    }

    /// Fire the window expiry. Resets and returns `true` only when a window
    /// is open and `now` has reached its deadline.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                tracing::debug!(
                    count = self.movement_count,
                    required = self.config.required_movements,
                    "liveness: window expired before threshold"
                );
                self.reset();
                true
            }
            _ => false,
        }
    }

    /// Return to `Idle`.
    pub fn reset(&mut self) {
        self.movement_count = 0;
        self.window_start = None;
        self.is_detected = false;
    }
}
