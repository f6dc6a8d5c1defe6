//! Erase resolver: remove the caller's strokes under the eraser.
//!
//! A stroke is hit when any of its points lies within the radius (point test,
//! not segment distance). Hit strokes are removed outright. Strokes of other
//! owners are never touched; hitting them is only reported so the session can
//! raise a throttled notice.

#[cfg(test)]
#[path = "erase_test.rs"]
mod erase_test;

use crate::buffer::StrokeBuffer;
use crate::stroke::{Point, Stroke};

/// Outcome of one eraser sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EraseReport {
    /// Own strokes removed.
    pub removed: usize,
    /// Foreign strokes under the eraser, left untouched.
    pub foreign_hits: usize,
}

impl EraseReport {
    #[must_use]
    pub fn touched_foreign(&self) -> bool {
        self.foreign_hits > 0
    }
}

/// Whether any point of `stroke` lies within `radius` of `center`.
#[must_use]
pub fn stroke_under_eraser(stroke: &Stroke, center: Point, radius: f64) -> bool {
    stroke.iter_points().any(|p| p.distance_to(center) <= radius)
}

/// Erase `owner`'s strokes under a circle of `radius` around `center`.
pub fn erase_at(buffer: &mut StrokeBuffer, owner: &str, center: Point, radius: f64) -> EraseReport {
    let foreign_hits = buffer
        .strokes()
        .iter()
        .filter(|s| !s.is_owned_by(owner) && stroke_under_eraser(s, center, radius))
        .count();
    let removed = buffer.remove_owned(owner, |s| stroke_under_eraser(s, center, radius));
    EraseReport { removed, foreign_hits }
}
