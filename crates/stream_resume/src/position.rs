//! Stream position tracking
//!
//! Holds `(position, buffer)` for one message. `position` counts content units
//! already materialized and never decreases; `buffer` only ever grows by
//! appending, so anything already rendered is never edited retroactively.

use crate::error::{Result, StreamError};

/// Merge a resume delta into previously materialized content.
///
/// Rejects positions behind `previous_position` instead of truncating, since
/// that would corrupt content the user has already seen.
pub fn merge(
    previous_buffer: &str,
    previous_position: u64,
    delta: &str,
    new_position: u64,
) -> Result<(String, u64)> {
    if new_position < previous_position {
        return Err(StreamError::NonMonotonicPosition {
            previous: previous_position,
            received: new_position,
        });
    }

    let mut buffer = String::with_capacity(previous_buffer.len() + delta.len());
    buffer.push_str(previous_buffer);
    buffer.push_str(delta);
    Ok((buffer, new_position))
}

/// Materialized content of one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionTracker {
    position: u64,
    buffer: String,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Apply a delta in place. On error the tracker is left untouched.
    pub fn apply(&mut self, delta: &str, new_position: u64) -> Result<()> {
        let (buffer, position) = merge(&self.buffer, self.position, delta, new_position)?;
        self.buffer = buffer;
        self.position = position;
        Ok(())
    }

    /// Discard everything; used by a full restart.
    pub fn reset(&mut self) {
        self.position = 0;
        self.buffer.clear();
    }
}
