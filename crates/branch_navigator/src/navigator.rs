//! Branch navigator
//!
//! UI-facing driver over the branch/version store. Renders `i/n` views,
//! steps cyclically between alternatives and keeps the stream client
//! consistent with what is being displayed.

use std::fmt;
use std::sync::Arc;

use chat_client::StoreSignal;
use chat_core::{BranchId, MessageId, VersionId};
use stream_resume::ResumableStreamClient;

use crate::error::{NavigationError, Result};
use crate::projection::{next_index, Direction};
use crate::store::{BranchVersionStore, NavigationGuard};

/// Which list of alternatives to navigate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationAxis {
    /// Branches rooted at the message (edits).
    Branches,
    /// Versions of the message (retries).
    Versions,
}

/// Result of a navigation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The store accepted the switch.
    Switched,
    /// Dropped because a navigation for the message is outstanding.
    Ignored,
    /// The target was already active, or there is nothing to switch to.
    Unchanged,
}

/// What the navigator control renders for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigatorView {
    pub active_index: Option<usize>,
    pub length: usize,
    pub label: String,
    pub is_loading: bool,
}

impl NavigatorView {
    /// `None` when there are no alternatives to choose from.
    pub fn new(active_index: Option<usize>, length: usize, is_loading: bool) -> Option<Self> {
        if length <= 1 {
            return None;
        }
        let label = match active_index {
            Some(index) => format!("{}/{}", index + 1, length),
            None => format!("-/{length}"),
        };
        Some(Self {
            active_index,
            length,
            label,
            is_loading,
        })
    }
}

impl fmt::Display for NavigatorView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

pub struct BranchNavigator {
    store: Arc<BranchVersionStore>,
    streams: ResumableStreamClient,
}

impl BranchNavigator {
    pub fn new(store: Arc<BranchVersionStore>, streams: ResumableStreamClient) -> Self {
        Self { store, streams }
    }

    pub fn store(&self) -> &Arc<BranchVersionStore> {
        &self.store
    }

    pub fn streams(&self) -> &ResumableStreamClient {
        &self.streams
    }

    pub fn branch_view(&self, message_id: &MessageId) -> Option<NavigatorView> {
        let projection = self.store.branches_for(message_id)?;
        NavigatorView::new(
            projection.active_index,
            projection.len(),
            self.store.is_navigating(message_id),
        )
    }

    pub fn version_view(&self, message_id: &MessageId) -> Option<NavigatorView> {
        let projection = self.store.versions_for(message_id)?;
        NavigatorView::new(
            projection.active_index,
            projection.len(),
            self.store.is_navigating(message_id),
        )
    }

    pub fn view(&self, message_id: &MessageId, axis: NavigationAxis) -> Option<NavigatorView> {
        match axis {
            NavigationAxis::Branches => self.branch_view(message_id),
            NavigationAxis::Versions => self.version_view(message_id),
        }
    }

    /// Pull the projection for `axis`.
    pub async fn refresh(&self, message_id: &MessageId, axis: NavigationAxis) -> Result<()> {
        match axis {
            NavigationAxis::Branches => {
                self.store.refresh_branches(message_id).await?;
            }
            NavigationAxis::Versions => {
                self.store.refresh_versions(message_id).await?;
            }
        }
        Ok(())
    }

    pub async fn next(&self, message_id: &MessageId, axis: NavigationAxis) -> Result<NavigationOutcome> {
        self.step(message_id, axis, Direction::Next).await
    }

    pub async fn prev(&self, message_id: &MessageId, axis: NavigationAxis) -> Result<NavigationOutcome> {
        self.step(message_id, axis, Direction::Prev).await
    }

    async fn step(
        &self,
        message_id: &MessageId,
        axis: NavigationAxis,
        direction: Direction,
    ) -> Result<NavigationOutcome> {
        let Ok(guard) = self.store.begin_navigation(message_id) else {
            tracing::debug!(message_id = %message_id, ?direction, "Navigation in flight, ignoring step");
            return Ok(NavigationOutcome::Ignored);
        };

        let (active_index, length) = self.position(message_id, axis).await?;
        if length <= 1 {
            return Ok(NavigationOutcome::Unchanged);
        }

        let current = active_index.unwrap_or(0);
        let target = next_index(current, length, direction);
        self.switch_held(&guard, axis, target).await
    }

    async fn position(&self, message_id: &MessageId, axis: NavigationAxis) -> Result<(Option<usize>, usize)> {
        let position = match axis {
            NavigationAxis::Branches => match self.store.branches_for(message_id) {
                Some(p) => (p.active_index, p.len()),
                None => {
                    let p = self.store.refresh_branches(message_id).await?;
                    (p.active_index, p.len())
                }
            },
            NavigationAxis::Versions => match self.store.versions_for(message_id) {
                Some(p) => (p.active_index, p.len()),
                None => {
                    let p = self.store.refresh_versions(message_id).await?;
                    (p.active_index, p.len())
                }
            },
        };
        Ok(position)
    }

    /// Switch to the alternative at `index` of the current projection.
    ///
    /// The message stays busy until the switch, the stream cancellation and
    /// the re-fetch have all finished; a concurrent request for the same
    /// message yields `Ignored`. A stale target re-fetches the projection and
    /// returns `TargetNotFound`.
    pub async fn switch_to(
        &self,
        message_id: &MessageId,
        axis: NavigationAxis,
        index: usize,
    ) -> Result<NavigationOutcome> {
        let Ok(guard) = self.store.begin_navigation(message_id) else {
            tracing::warn!(message_id = %message_id, ?axis, index, "Navigation busy, request dropped");
            return Ok(NavigationOutcome::Ignored);
        };
        self.switch_held(&guard, axis, index).await
    }

    async fn switch_held(
        &self,
        guard: &NavigationGuard,
        axis: NavigationAxis,
        index: usize,
    ) -> Result<NavigationOutcome> {
        let message_id = guard.message_id();
        let result = match axis {
            NavigationAxis::Branches => self.switch_branch(guard, index).await,
            NavigationAxis::Versions => self.switch_version(guard, index).await,
        };

        match result {
            Err(err @ NavigationError::TargetNotFound(_)) => {
                tracing::warn!(message_id = %message_id, ?axis, index, error = %err, "Stale navigation target");
                if let Err(refresh_err) = self.refresh(message_id, axis).await {
                    tracing::warn!(message_id = %message_id, error = %refresh_err, "Re-fetch after stale target failed");
                }
                Err(err)
            }
            other => other,
        }
    }

    async fn switch_branch(&self, guard: &NavigationGuard, index: usize) -> Result<NavigationOutcome> {
        let message_id = guard.message_id();
        let Some(projection) = self.store.branches_for(message_id) else {
            return Err(NavigationError::TargetNotFound(format!(
                "branches of message {message_id}"
            )));
        };
        if projection.active_index == Some(index) {
            return Ok(NavigationOutcome::Unchanged);
        }

        self.store.switch_branch_with(guard, index).await?;
        // The displayed continuation changed; any stream on it is stale.
        self.cancel_stream(message_id, "branch switch").await;
        self.store.refresh_branches(message_id).await?;
        Ok(NavigationOutcome::Switched)
    }

    async fn switch_version(&self, guard: &NavigationGuard, index: usize) -> Result<NavigationOutcome> {
        let message_id = guard.message_id();
        let Some(projection) = self.store.versions_for(message_id) else {
            return Err(NavigationError::TargetNotFound(format!(
                "versions of message {message_id}"
            )));
        };
        if projection.active_index == Some(index) {
            return Ok(NavigationOutcome::Unchanged);
        }
        let target = projection.get(index).ok_or_else(|| {
            NavigationError::TargetNotFound(format!("version index {index} of message {message_id}"))
        })?;
        let content_differs = projection
            .active()
            .map_or(true, |active| active.content != target.content);

        self.store.switch_version_with(guard, &target.version_id).await?;
        if content_differs {
            self.cancel_stream(message_id, "version switch").await;
        }
        self.store.refresh_versions(message_id).await?;
        Ok(NavigationOutcome::Switched)
    }

    async fn cancel_stream(&self, message_id: &MessageId, reason: &str) {
        if self.streams.deactivate(message_id).await {
            tracing::info!(message_id = %message_id, reason, "Cancelled stream superseded by navigation");
        }
    }

    /// Edit `message_id`; the new branch becomes active.
    pub async fn edit(&self, message_id: &MessageId, content: &str) -> Result<BranchId> {
        let branch_id = self.store.edit_message(message_id, content).await?;
        self.store.refresh_branches(message_id).await?;
        Ok(branch_id)
    }

    /// Retry `message_id` with `model`; the new version becomes active. The
    /// stream for the superseded version is cancelled once the store has
    /// accepted the retry. On failure it keeps running.
    pub async fn retry(&self, message_id: &MessageId, model: &str) -> Result<VersionId> {
        let version_id = self.store.retry_message(message_id, model).await?;
        self.cancel_stream(message_id, "retry").await;
        self.store.refresh_versions(message_id).await?;
        Ok(version_id)
    }

    /// Pull the projection a store signal refers to.
    pub async fn handle_signal(&self, signal: &StoreSignal) -> Result<()> {
        match signal {
            StoreSignal::BranchesChanged { message_id } => {
                self.store.refresh_branches(message_id).await?;
            }
            StoreSignal::VersionsChanged { message_id } => {
                self.store.refresh_versions(message_id).await?;
            }
            StoreSignal::StreamAdvanced { .. } | StoreSignal::StreamCompleted { .. } => {}
        }
        Ok(())
    }
}
