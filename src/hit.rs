//! Hit-testing: which stroke is under the pointer.
//!
//! Read-only. The first stroke whose polyline passes strictly within the
//! threshold wins; there is no nearest-of-all tie-break.

#[cfg(test)]
#[path = "hit_test.rs"]
mod hit_test;

use crate::stroke::{Point, Stroke};

/// Result of a hit test.
#[derive(Debug, Clone, Copy)]
pub struct Hit<'a> {
    /// Position of the stroke in the list it was found in.
    pub index: usize,
    pub stroke: &'a Stroke,
}

/// Shortest distance from `p` to the segment `a`–`b`. A zero-length segment
/// degrades to the distance to `a`.
#[must_use]
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return p.distance_to(a);
    }

    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance_to(Point::new(a.x + t * dx, a.y + t * dy))
}

/// Whether any segment of `stroke` passes within `threshold` of `pointer`.
/// Single-point strokes have no segment and never match.
#[must_use]
pub fn stroke_near(stroke: &Stroke, pointer: Point, threshold: f64) -> bool {
    stroke
        .iter_points()
        .zip(stroke.iter_points().skip(1))
        .any(|(a, b)| distance_to_segment(pointer, a, b) < threshold)
}

/// First stroke in `strokes` under `pointer`.
#[must_use]
pub fn stroke_at(strokes: &[Stroke], pointer: Point, threshold: f64) -> Option<Hit<'_>> {
    strokes
        .iter()
        .enumerate()
        .find(|(_, stroke)| stroke_near(stroke, pointer, threshold))
        .map(|(index, stroke)| Hit { index, stroke })
}
