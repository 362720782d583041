//! Branch - an alternative continuation rooted at a fork point

use serde::{Deserialize, Serialize};

use crate::ids::{BranchId, MessageId};

/// An alternative continuation of a conversation.
///
/// Branches are created once by the store and never reordered: `ordinal` is
/// assigned at creation and is immutable.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: BranchId,
    pub fork_point_message_id: MessageId,
    pub ordinal: u32,
    pub is_active: bool,
}

/// Subscription payload for `getMessageBranches`.
///
/// Payload order is not stable across updates; consumers must order by
/// `ordinal`. `active_index` refers to payload order and may be negative when
/// the store has no active branch.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BranchSnapshot {
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub active_index: i64,
}

impl BranchSnapshot {
    /// Payload-order active index, if it points inside the payload.
    pub fn active_index_hint(&self) -> Option<usize> {
        usize::try_from(self.active_index)
            .ok()
            .filter(|index| *index < self.branches.len())
    }
}
