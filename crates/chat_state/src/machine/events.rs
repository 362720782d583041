//! Stream events - Defines events that trigger state transitions

use serde::{Deserialize, Serialize};

/// Events that can trigger state transitions of a stream session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    // ========== Lifecycle ==========
    /// The owning view activated the session; the first resume call is issued.
    Activated,

    /// The view unmounted or the message was superseded.
    Cancelled,

    // ========== Resume responses ==========
    /// A resume response was merged and the stream is still open.
    DeltaMerged { position: u64 },

    /// A resume response reported completion.
    Completed { position: u64 },

    // ========== Failures ==========
    /// Network or server failure during a resume call.
    TransportFailed { error: String },

    /// The store reported a position behind the local one.
    ProtocolViolation { error: String },

    // ========== User actions ==========
    /// Explicit retry from the error banner.
    ManualRetry,
}

impl StreamEvent {
    /// Check if this event is user-initiated.
    pub fn is_user_event(&self) -> bool {
        matches!(self, Self::ManualRetry | Self::Cancelled)
    }

    /// Check if this is an error event.
    pub fn is_error_event(&self) -> bool {
        matches!(
            self,
            Self::TransportFailed { .. } | Self::ProtocolViolation { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Activated => "activated",
            Self::Cancelled => "cancelled",
            Self::DeltaMerged { .. } => "delta_merged",
            Self::Completed { .. } => "completed",
            Self::TransportFailed { .. } => "transport_failed",
            Self::ProtocolViolation { .. } => "protocol_violation",
            Self::ManualRetry => "manual_retry",
        }
    }
}
