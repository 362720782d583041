//! Resume endpoint payloads

use serde::{Deserialize, Serialize};

/// Response of `resumeStream(messageId, fromPosition)`.
///
/// `delta` is the content between `fromPosition` and `new_position`. Calling
/// again at or past the store's current position yields an empty delta with
/// the same position and completion flag.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResumeResponse {
    pub delta: String,
    pub new_position: u64,
    pub is_complete: bool,
}

impl ResumeResponse {
    pub fn new(delta: impl Into<String>, new_position: u64, is_complete: bool) -> Self {
        Self {
            delta: delta.into(),
            new_position,
            is_complete,
        }
    }

    /// An empty delta at `position`.
    pub fn empty(position: u64, is_complete: bool) -> Self {
        Self::new(String::new(), position, is_complete)
    }
}
