//! Stream states - Defines all possible states of a stream session

use serde::{Deserialize, Serialize};

/// Lifecycle state of one stream session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StreamState {
    /// Created but no resume call issued yet.
    #[default]
    Idle,

    /// Polling the resume endpoint.
    Streaming,

    /// Re-entering the poll loop from the last known position after an
    /// interruption or a manual retry.
    Resuming,

    /// The store reported completion. Terminal.
    Complete,

    /// A resume call failed. Partial content is retained.
    Error {
        message: String,
        /// Fatal errors need a restart from position 0.
        fatal: bool,
        failed_at: String, // ISO timestamp
    },
}

impl StreamState {
    /// Check if this is a terminal state (no more transitions expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Whether resume calls are being issued.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming | Self::Resuming)
    }

    /// Whether a session in this state is kept in the session map.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Streaming | Self::Resuming | Self::Error { .. })
    }

    /// Whether a manual retry can resume from the retained position.
    pub fn is_recoverable_error(&self) -> bool {
        matches!(self, Self::Error { fatal: false, .. })
    }

    pub fn is_fatal_error(&self) -> bool {
        matches!(self, Self::Error { fatal: true, .. })
    }

    /// Get a human-readable description of the current state.
    pub fn description(&self) -> &str {
        match self {
            Self::Idle => "Waiting to start",
            Self::Streaming => "Receiving response",
            Self::Resuming => "Reconnecting",
            Self::Complete => "Complete",
            Self::Error { fatal: false, .. } => "Interrupted, retry available",
            Self::Error { fatal: true, .. } => "Stream out of sync, restart required",
        }
    }
}
