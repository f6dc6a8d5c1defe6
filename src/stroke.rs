//! Stroke model: freehand strokes, the shared tile document, and their invariants.
//!
//! A `Stroke` stores its points flattened (`[x0, y0, x1, y1, ...]`) exactly as
//! they are persisted. `owner` and `points` are private so that the only way to
//! grow a stroke is [`Stroke::append`], which rejects any caller that is not
//! the stroke's owner.
//!
//! Two flags track persistence. `saved` is monotonic and flips to `true` once a
//! write containing the stroke is acknowledged. `dirty` marks local edits that
//! no acknowledged write has covered yet; it is what keeps a stroke that is
//! still being extended alive across reconciliation. Neither flag is persisted.

#[cfg(test)]
#[path = "stroke_test.rs"]
mod stroke_test;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Milliseconds since the Unix epoch. Doubles as the per-owner stroke key.
pub type Timestamp = i64;

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> Timestamp {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// POINT
// =============================================================================

/// A pointer position in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_to(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StrokeError {
    #[error("stroke owner must not be empty")]
    EmptyOwner,
    #[error("stroke points must be coordinate pairs, got {0} values")]
    OddCoordinates(usize),
    #[error("stroke needs at least one point")]
    NoPoints,
    #[error("stroke coordinates must be finite")]
    NonFinite,
    #[error("stroke owned by {owner} cannot be edited by {by}")]
    NotOwner { owner: String, by: String },
}

impl ErrorCode for StrokeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyOwner => "E_STROKE_EMPTY_OWNER",
            Self::OddCoordinates(_) => "E_STROKE_ODD_COORDINATES",
            Self::NoPoints => "E_STROKE_NO_POINTS",
            Self::NonFinite => "E_STROKE_NON_FINITE",
            Self::NotOwner { .. } => "E_STROKE_NOT_OWNER",
        }
    }
}

// =============================================================================
// STROKE
// =============================================================================

/// Drawing tool recorded on a stroke. The eraser never creates strokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeTool {
    #[default]
    Pen,
}

fn decoded_is_saved() -> bool {
    true
}

/// One continuous pen path, attributed to exactly one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    points: Vec<f64>,
    pub color: String,
    #[serde(default)]
    pub tool: StrokeTool,
    owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<Timestamp>,
    /// Anything read back from the store has been persisted.
    #[serde(skip, default = "decoded_is_saved")]
    saved: bool,
    #[serde(skip)]
    dirty: bool,
}

impl Stroke {
    /// Start a new unsaved pen stroke at `origin`.
    ///
    /// # Errors
    ///
    /// Returns an error if `owner` is empty or `origin` is not finite.
    pub fn begin(
        owner: impl Into<String>,
        color: impl Into<String>,
        origin: Point,
        timestamp: Timestamp,
    ) -> Result<Self, StrokeError> {
        Self::new(owner, color, vec![origin.x, origin.y], Some(timestamp))
    }

    /// Build an unsaved stroke from flattened points.
    ///
    /// # Errors
    ///
    /// Returns an error if the stroke violates any of the invariants checked by
    /// [`Stroke::validate`].
    pub fn new(
        owner: impl Into<String>,
        color: impl Into<String>,
        points: Vec<f64>,
        timestamp: Option<Timestamp>,
    ) -> Result<Self, StrokeError> {
        let stroke = Self {
            points,
            color: color.into(),
            tool: StrokeTool::Pen,
            owner: owner.into(),
            owner_display_name: None,
            timestamp,
            saved: false,
            dirty: true,
        };
        stroke.validate()?;
        Ok(stroke)
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.owner_display_name = Some(name.into());
        self
    }

    /// The same stroke as it looks after a round trip through the store.
    #[must_use]
    pub fn into_saved(mut self) -> Self {
        self.saved = true;
        self.dirty = false;
        self
    }

    /// Check the shape invariants: non-empty owner, whole coordinate pairs,
    /// at least one point, finite coordinates.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), StrokeError> {
        if self.owner.is_empty() {
            return Err(StrokeError::EmptyOwner);
        }
        if self.points.len() % 2 != 0 {
            return Err(StrokeError::OddCoordinates(self.points.len()));
        }
        if self.points.is_empty() {
            return Err(StrokeError::NoPoints);
        }
        if self.points.iter().any(|v| !v.is_finite()) {
            return Err(StrokeError::NonFinite);
        }
        Ok(())
    }

    /// Append a point. Only the stroke's owner may extend it.
    ///
    /// # Errors
    ///
    /// Returns [`StrokeError::NotOwner`] for any other caller and
    /// [`StrokeError::NonFinite`] for a non-finite point.
    pub fn append(&mut self, by: &str, point: Point) -> Result<(), StrokeError> {
        if self.owner != by {
            return Err(StrokeError::NotOwner { owner: self.owner.clone(), by: by.to_owned() });
        }
        if !point.is_finite() {
            return Err(StrokeError::NonFinite);
        }
        self.points.push(point.x);
        self.points.push(point.y);
        self.dirty = true;
        Ok(())
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }

    /// Flattened coordinates.
    #[must_use]
    pub fn points(&self) -> &[f64] {
        &self.points
    }

    /// Number of points (coordinate pairs).
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len() / 2
    }

    pub fn iter_points(&self) -> impl Iterator<Item = Point> + '_ {
        self.points.chunks_exact(2).map(|pair| Point::new(pair[0], pair[1]))
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    #[must_use]
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// Whether this stroke has local edits no acknowledged write has covered.
    #[must_use]
    pub fn has_local_edits(&self) -> bool {
        self.dirty
    }

    /// Stable label for UI affordances: `owner-timestamp`.
    #[must_use]
    pub fn key(&self) -> String {
        match self.timestamp {
            Some(ts) => format!("{}-{ts}", self.owner),
            None => format!("{}-", self.owner),
        }
    }

    /// Fill in a missing timestamp and return the one in effect.
    pub(crate) fn ensure_timestamp(&mut self, now: Timestamp) -> Timestamp {
        *self.timestamp.get_or_insert(now)
    }

    /// Record that a write containing the first `written_values` coordinates
    /// of this stroke was acknowledged.
    pub(crate) fn acknowledge(&mut self, written_values: usize) {
        self.saved = true;
        if self.points.len() == written_values {
            self.dirty = false;
        }
    }
}

// =============================================================================
// TILE
// =============================================================================

/// Key of a shared tile. Tiles are addressed by grid position, `"x_y"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileKey(String);

impl TileKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Tile at grid position `(x, y)`.
    #[must_use]
    pub fn at(x: i64, y: i64) -> Self {
        Self(format!("{x}_{y}"))
    }

    /// The single shared canvas.
    #[must_use]
    pub fn origin() -> Self {
        Self::at(0, 0)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TileKey {
    fn default() -> Self {
        Self::origin()
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TileKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// The shared document: the union of every owner's strokes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    #[serde(default)]
    pub strokes: Vec<Stroke>,
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl Tile {
    #[must_use]
    pub fn empty(updated_at: Timestamp) -> Self {
        Self { strokes: Vec::new(), updated_at }
    }

    pub fn strokes_by<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a Stroke> + 'a {
        self.strokes.iter().filter(move |s| s.is_owned_by(owner))
    }
}
