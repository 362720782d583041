//! Navigation error types

use chat_client::BackendError;
use chat_core::MessageId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    /// The addressed branch or version is not in the latest projection, or
    /// the store no longer knows it. Re-fetch before trying again.
    #[error("Navigation target not found: {0}")]
    TargetNotFound(String),

    /// A navigation request for the same message is still outstanding.
    #[error("Navigation already in progress for message {0}")]
    Busy(MessageId),

    #[error("Switch rejected by store: {0}")]
    Rejected(String),

    #[error("Store error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationErrorKind {
    TargetNotFound,
    Busy,
    Rejected,
    Backend,
}

impl NavigationError {
    pub fn kind(&self) -> NavigationErrorKind {
        match self {
            Self::TargetNotFound(_) => NavigationErrorKind::TargetNotFound,
            Self::Busy(_) => NavigationErrorKind::Busy,
            Self::Rejected(_) => NavigationErrorKind::Rejected,
            Self::Backend(_) => NavigationErrorKind::Backend,
        }
    }
}

impl From<BackendError> for NavigationError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(what) => Self::TargetNotFound(what),
            BackendError::Rejected(reason) => Self::Rejected(reason),
            other => Self::Backend(other.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeepLinkError {
    #[error("Empty locator")]
    Empty,

    #[error("Locator has no message id: {0}")]
    MissingMessageId(String),

    #[error("Malformed locator: {0}")]
    Malformed(String),

    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

pub type Result<T> = std::result::Result<T, NavigationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_map_to_navigation_kinds() {
        let not_found: NavigationError = BackendError::NotFound("branch b9".into()).into();
        assert_eq!(not_found.kind(), NavigationErrorKind::TargetNotFound);

        let rejected: NavigationError = BackendError::Rejected("stale".into()).into();
        assert_eq!(rejected.kind(), NavigationErrorKind::Rejected);

        let transport: NavigationError = BackendError::Transport("reset".into()).into();
        assert_eq!(transport.kind(), NavigationErrorKind::Backend);
    }
}
