//! Deep links to a message and, optionally, one of its branches.
//!
//! Accepted forms:
//! - `https://host/chat/42?message=<id>&branch=<id>` (`messageId`/`branchId` too)
//! - `<messageId>`
//! - `<messageId>/<branchId>`

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chat_core::{BranchId, MessageId};
use url::Url;

use crate::error::{DeepLinkError, NavigationError};
use crate::navigator::{BranchNavigator, NavigationAxis, NavigationOutcome, NavigatorView};

const MESSAGE_KEYS: [&str; 2] = ["message", "messageId"];
const BRANCH_KEYS: [&str; 2] = ["branch", "branchId"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLocator {
    pub message_id: MessageId,
    pub branch_id: Option<BranchId>,
}

impl MessageLocator {
    pub fn new(message_id: MessageId, branch_id: Option<BranchId>) -> Self {
        Self {
            message_id,
            branch_id,
        }
    }

    pub fn parse(input: &str) -> Result<Self, DeepLinkError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DeepLinkError::Empty);
        }
        if input.contains("://") {
            Self::parse_url(input)
        } else {
            Self::parse_bare(input)
        }
    }

    fn parse_url(input: &str) -> Result<Self, DeepLinkError> {
        let url = Url::parse(input).map_err(|e| DeepLinkError::Malformed(format!("{input}: {e}")))?;

        let lookup = |keys: &[&str]| {
            url.query_pairs()
                .find(|(key, value)| keys.contains(&&**key) && !value.is_empty())
                .map(|(_, value)| value.into_owned())
        };

        let message_id = lookup(&MESSAGE_KEYS)
            .ok_or_else(|| DeepLinkError::MissingMessageId(input.to_string()))?;
        let branch_id = lookup(&BRANCH_KEYS);

        Ok(Self::new(
            MessageId::new(message_id),
            branch_id.map(BranchId::new),
        ))
    }

    fn parse_bare(input: &str) -> Result<Self, DeepLinkError> {
        if input.chars().any(char::is_whitespace) {
            return Err(DeepLinkError::Malformed(input.to_string()));
        }

        let (message, branch) = match input.split_once('/') {
            Some((message, branch)) => (message, Some(branch)),
            None => (input, None),
        };
        if message.is_empty() {
            return Err(DeepLinkError::MissingMessageId(input.to_string()));
        }
        if branch.is_some_and(|branch| branch.is_empty() || branch.contains('/')) {
            return Err(DeepLinkError::Malformed(input.to_string()));
        }

        Ok(Self::new(
            MessageId::new(message),
            branch.map(BranchId::new),
        ))
    }
}

impl FromStr for MessageLocator {
    type Err = DeepLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MessageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.branch_id {
            Some(branch_id) => write!(f, "{}/{}", self.message_id, branch_id),
            None => write!(f, "{}", self.message_id),
        }
    }
}

/// State reached after following a locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub message_id: MessageId,
    pub active_branch_id: Option<BranchId>,
    pub outcome: NavigationOutcome,
    pub view: Option<NavigatorView>,
}

/// Drives a [`BranchNavigator`] to the state a locator addresses.
pub struct DeepLinkResolver {
    navigator: Arc<BranchNavigator>,
}

impl DeepLinkResolver {
    pub fn new(navigator: Arc<BranchNavigator>) -> Self {
        Self { navigator }
    }

    pub async fn resolve_str(&self, input: &str) -> Result<Resolution, DeepLinkError> {
        let locator = MessageLocator::parse(input)?;
        self.resolve(&locator).await
    }

    pub async fn resolve(&self, locator: &MessageLocator) -> Result<Resolution, DeepLinkError> {
        let message_id = &locator.message_id;
        let store = self.navigator.store();
        let projection = store.refresh_branches(message_id).await?;

        let outcome = match &locator.branch_id {
            None => NavigationOutcome::Unchanged,
            Some(branch_id) => {
                let index = projection.index_of(branch_id).ok_or_else(|| {
                    NavigationError::TargetNotFound(format!(
                        "branch {branch_id} of message {message_id}"
                    ))
                })?;
                self.navigator
                    .switch_to(message_id, NavigationAxis::Branches, index)
                    .await?
            }
        };

        let active_branch_id = store
            .branches_for(message_id)
            .and_then(|projection| projection.active().map(|branch| branch.id.clone()));
        tracing::info!(
            message_id = %message_id,
            branch_id = ?locator.branch_id,
            ?outcome,
            "Deep link resolved"
        );

        Ok(Resolution {
            message_id: message_id.clone(),
            active_branch_id,
            outcome,
            view: self.navigator.branch_view(message_id),
        })
    }
}
