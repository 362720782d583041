use chat_core::MessageId;

use crate::error::StreamError;
use crate::session::Generation;

/// Notifications emitted by the resumable stream client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    /// New content was merged.
    ContentUpdated {
        message_id: MessageId,
        generation: Generation,
        delta: String,
        content: String,
        position: u64,
    },
    /// The store reported completion; polling stopped.
    Completed {
        message_id: MessageId,
        generation: Generation,
        content: String,
        position: u64,
    },
    /// A resume call failed; partial content is retained.
    Failed {
        message_id: MessageId,
        generation: Generation,
        error: StreamError,
    },
    /// The session was discarded.
    Cancelled {
        message_id: MessageId,
        generation: Generation,
    },
}

impl StreamUpdate {
    pub fn message_id(&self) -> &MessageId {
        match self {
            Self::ContentUpdated { message_id, .. }
            | Self::Completed { message_id, .. }
            | Self::Failed { message_id, .. }
            | Self::Cancelled { message_id, .. } => message_id,
        }
    }

    pub fn generation(&self) -> Generation {
        match self {
            Self::ContentUpdated { generation, .. }
            | Self::Completed { generation, .. }
            | Self::Failed { generation, .. }
            | Self::Cancelled { generation, .. } => *generation,
        }
    }
}
