//! Tool state and the UI-facing records derived from the stroke list.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use crate::stroke::{Point, Stroke, Timestamp};

/// Colors offered by the pen palette.
pub const PALETTE: [&str; 12] = [
    "#000000", "#FFFFFF", "#FF0000", "#00FF00", "#0000FF", "#FFFF00", "#FF00FF", "#00FFFF", "#FFA500", "#800080",
    "#A52A2A", "#FFC0CB",
];

pub const DEFAULT_COLOR: &str = "#000000";

/// Eraser diameter bounds, in pixels.
pub const ERASER_MIN_SIZE: f64 = 10.0;
pub const ERASER_MAX_SIZE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolKind {
    #[default]
    Pen,
    Eraser,
}

/// Clamp a requested eraser diameter into the supported range. Non-finite
/// sizes are rejected.
#[must_use]
pub fn clamp_eraser_size(size: f64) -> Option<f64> {
    size.is_finite().then(|| size.clamp(ERASER_MIN_SIZE, ERASER_MAX_SIZE))
}

/// "Who drew this" affordance for the stroke under the pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct Tooltip {
    pub position: Point,
    pub owner: String,
    pub display_name: Option<String>,
    /// `owner-timestamp` of the hovered stroke.
    pub stroke_key: String,
    pub stroke_timestamp: Option<Timestamp>,
}

impl Tooltip {
    #[must_use]
    pub fn for_stroke(stroke: &Stroke, position: Point) -> Self {
        Self {
            position,
            owner: stroke.owner().to_owned(),
            display_name: stroke.owner_display_name.clone(),
            stroke_key: stroke.key(),
            stroke_timestamp: stroke.timestamp(),
        }
    }

    /// Display name if known, otherwise the owner id.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.owner)
    }
}

/// Circle drawn under the pointer while the eraser is selected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EraserPreview {
    pub center: Point,
    pub radius: f64,
}

/// Everything a rendering surface needs for one frame. Read-only.
#[derive(Debug, Clone, Default)]
pub struct RenderFrame {
    pub strokes: Vec<Stroke>,
    pub eraser_preview: Option<EraserPreview>,
}
