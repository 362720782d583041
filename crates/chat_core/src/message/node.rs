//! Message - a node in a conversation

use serde::{Deserialize, Serialize};

use super::Role;
use crate::ids::{BranchId, MessageId, VersionId};

/// A node in a conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    /// Active branch when this message is a fork point.
    #[serde(default)]
    pub active_branch_id: Option<BranchId>,
    /// Active version when this message has been retried.
    #[serde(default)]
    pub active_version_id: Option<VersionId>,
}

impl Message {
    pub fn new(id: MessageId, role: Role) -> Self {
        Self {
            id,
            role,
            active_branch_id: None,
            active_version_id: None,
        }
    }

    /// Whether the message has been edited or forked at least once.
    pub fn is_fork_point(&self) -> bool {
        self.active_branch_id.is_some()
    }
}
