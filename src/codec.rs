//! Tolerant decoding of persisted tile strokes.
//!
//! The store is shared with every other client, so one malformed stroke must
//! not make the whole tile unreadable. Strokes that fail to deserialize or
//! violate the stroke invariants are skipped with a warning.

#[cfg(test)]
#[path = "codec_test.rs"]
mod codec_test;

use serde_json::Value;
use tracing::warn;

use crate::stroke::Stroke;

/// Decode a persisted stroke array, skipping entries that are not valid strokes.
#[must_use]
pub fn decode_strokes(value: Value) -> Vec<Stroke> {
    let Value::Array(items) = value else {
        warn!("tile strokes field is not an array; treating as empty");
        return Vec::new();
    };

    let mut strokes = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<Stroke>(item) {
            Ok(stroke) => match stroke.validate() {
                Ok(()) => strokes.push(stroke),
                Err(e) => warn!(index, error = %e, "skipping invalid stroke"),
            },
            Err(e) => warn!(index, error = %e, "skipping undecodable stroke"),
        }
    }
    strokes
}

/// Encode strokes for storage.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_strokes(strokes: &[Stroke]) -> Result<Value, serde_json::Error> {
    serde_json::to_value(strokes)
}

