use chat_core::MessageId;
use serde::{Deserialize, Serialize};

/// Change notification emitted by a store. Carries no data; consumers pull
/// the affected projection when they receive one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreSignal {
    BranchesChanged { message_id: MessageId },
    VersionsChanged { message_id: MessageId },
    StreamAdvanced { message_id: MessageId, position: u64 },
    StreamCompleted { message_id: MessageId, position: u64 },
}

impl StoreSignal {
    pub fn message_id(&self) -> &MessageId {
        match self {
            Self::BranchesChanged { message_id }
            | Self::VersionsChanged { message_id }
            | Self::StreamAdvanced { message_id, .. }
            | Self::StreamCompleted { message_id, .. } => message_id,
        }
    }
}
