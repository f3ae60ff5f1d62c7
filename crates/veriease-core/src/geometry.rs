//! Planar helpers over normalized landmark coordinates.

use serde::{Deserialize, Serialize};

/// A landmark point in normalized image coordinates (both axes in `[0, 1]`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

/// Arithmetic mean of a point set. `None` for an empty slice.
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
    let n = points.len() as f32;
    Some(Point::new(sx / n, sy / n))
}

/// Linear min-max normalization clamped to `[0, 1]`.
///
/// A degenerate range (`max == min`) yields 0.0.
pub fn normalize(value: f32, min: f32, max: f32) -> f32 {
    let span = max - min;
    if span == 0.0 {
        return 0.0;
    }
    ((value - min) / span).clamp(0.0, 1.0)
}
