//! Version - an alternative content payload produced by retrying

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, VersionId};

/// One retry result for a message. Versions of a message form a flat list in
/// creation order; exactly one is active.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub version_id: VersionId,
    pub message_id: MessageId,
    pub content: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Subscription payload for `getMessageVersions`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    pub versions: Vec<Version>,
    #[serde(default)]
    pub active_index: i64,
}

impl VersionSnapshot {
    /// Payload-order active index, if it points inside the payload.
    pub fn active_index_hint(&self) -> Option<usize> {
        usize::try_from(self.active_index)
            .ok()
            .filter(|index| *index < self.versions.len())
    }
}
