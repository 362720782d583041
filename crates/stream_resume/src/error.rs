//! Stream session error types

use chat_client::BackendError;
use chat_core::MessageId;
use chat_state::TransitionError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Network or 5xx failure during resume. Partial content is kept and a
    /// manual retry resumes from the last position.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The store reported a position behind the local one. Fatal for the
    /// session: it can only restart from position 0.
    #[error("Stream position went backwards: had {previous}, received {received}")]
    NonMonotonicPosition { previous: u64, received: u64 },

    /// Non-transient store failure (unknown stream, malformed body).
    #[error("Store error: {0}")]
    Backend(String),

    #[error("No stream session for message {0}")]
    NoSession(MessageId),

    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    Transport,
    NonMonotonicPosition,
    Backend,
    NoSession,
    InvalidState,
}

impl StreamError {
    pub fn kind(&self) -> StreamErrorKind {
        match self {
            Self::Transport(_) => StreamErrorKind::Transport,
            Self::NonMonotonicPosition { .. } => StreamErrorKind::NonMonotonicPosition,
            Self::Backend(_) => StreamErrorKind::Backend,
            Self::NoSession(_) => StreamErrorKind::NoSession,
            Self::InvalidState(_) => StreamErrorKind::InvalidState,
        }
    }

    /// Fatal errors require a full restart from position 0.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NonMonotonicPosition { .. })
    }
}

impl From<BackendError> for StreamError {
    fn from(err: BackendError) -> Self {
        if err.is_transient() {
            Self::Transport(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}

impl From<TransitionError> for StreamError {
    fn from(err: TransitionError) -> Self {
        Self::InvalidState(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
