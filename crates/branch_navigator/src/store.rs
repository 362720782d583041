//! Branch/Version store
//!
//! Client-side projection of the branches and versions the external store
//! reports for each message, plus the mutations that change them. The store
//! here never writes the projection optimistically: a successful switch is
//! only visible once a fresh snapshot is applied.

use std::sync::Arc;

use chat_client::{BranchBackend, BranchTarget};
use chat_core::{BranchId, BranchSnapshot, MessageId, VersionId, VersionSnapshot};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{NavigationError, Result};
use crate::projection::{BranchProjection, VersionProjection};

/// Mutation awaiting the store's answer, for optimistic rendering next to the
/// authoritative list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingMutation {
    Edit { content: String },
    Retry { model: String },
}

/// Held while a navigation request for one message is outstanding. Other
/// requests for the same message fail with `Busy` until it is dropped.
pub struct NavigationGuard {
    in_flight: Arc<DashMap<MessageId, ()>>,
    message_id: MessageId,
}

impl NavigationGuard {
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }
}

impl Drop for NavigationGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.message_id);
    }
}

pub struct BranchVersionStore {
    backend: Arc<dyn BranchBackend>,
    branches: DashMap<MessageId, BranchProjection>,
    versions: DashMap<MessageId, VersionProjection>,
    in_flight: Arc<DashMap<MessageId, ()>>,
    pending: DashMap<MessageId, PendingMutation>,
}

impl BranchVersionStore {
    pub fn new(backend: Arc<dyn BranchBackend>) -> Self {
        Self {
            backend,
            branches: DashMap::new(),
            versions: DashMap::new(),
            in_flight: Arc::new(DashMap::new()),
            pending: DashMap::new(),
        }
    }

    /// Sorted branches of a fork point, if a snapshot was applied.
    pub fn branches_for(&self, message_id: &MessageId) -> Option<BranchProjection> {
        self.branches.get(message_id).map(|entry| entry.clone())
    }

    /// Sorted versions of a message, if a snapshot was applied.
    pub fn versions_for(&self, message_id: &MessageId) -> Option<VersionProjection> {
        self.versions.get(message_id).map(|entry| entry.clone())
    }

    /// Replace the branch projection with a subscription snapshot.
    pub fn apply_branches(
        &self,
        message_id: &MessageId,
        snapshot: BranchSnapshot,
    ) -> BranchProjection {
        let projection = BranchProjection::from_snapshot(message_id, snapshot);
        tracing::debug!(
            message_id = %message_id,
            length = projection.len(),
            active_index = ?projection.active_index,
            "Branch projection updated"
        );
        self.branches.insert(message_id.clone(), projection.clone());
        projection
    }

    /// Replace the version projection with a subscription snapshot.
    pub fn apply_versions(
        &self,
        message_id: &MessageId,
        snapshot: VersionSnapshot,
    ) -> VersionProjection {
        let projection = VersionProjection::from_snapshot(message_id, snapshot);
        tracing::debug!(
            message_id = %message_id,
            length = projection.len(),
            active_index = ?projection.active_index,
            "Version projection updated"
        );
        self.versions.insert(message_id.clone(), projection.clone());
        projection
    }

    pub async fn refresh_branches(&self, message_id: &MessageId) -> Result<BranchProjection> {
        let snapshot = self.backend.get_message_branches(message_id).await?;
        Ok(self.apply_branches(message_id, snapshot))
    }

    pub async fn refresh_versions(&self, message_id: &MessageId) -> Result<VersionProjection> {
        let snapshot = self.backend.get_message_versions(message_id).await?;
        Ok(self.apply_versions(message_id, snapshot))
    }

    /// Whether a navigation request for `message_id` is outstanding.
    pub fn is_navigating(&self, message_id: &MessageId) -> bool {
        self.in_flight.contains_key(message_id)
    }

    pub fn pending_for(&self, message_id: &MessageId) -> Option<PendingMutation> {
        self.pending.get(message_id).map(|entry| entry.clone())
    }

    /// Claim the message for one navigation. Callers that follow a switch
    /// with more work (cancelling streams, re-fetching) hold the guard until
    /// that work is done and use the `*_with` switches meanwhile.
    pub fn begin_navigation(&self, message_id: &MessageId) -> Result<NavigationGuard> {
        match self.in_flight.entry(message_id.clone()) {
            Entry::Occupied(_) => Err(NavigationError::Busy(message_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(NavigationGuard {
                    in_flight: self.in_flight.clone(),
                    message_id: message_id.clone(),
                })
            }
        }
    }

    /// Activate the branch at `target_index` of the current projection.
    ///
    /// Fails with `Busy` while another navigation for the message is
    /// outstanding and with `TargetNotFound` when the index is outside the
    /// latest projection or the store no longer has the branch.
    pub async fn switch_branch(
        &self,
        message_id: &MessageId,
        target_index: usize,
    ) -> Result<BranchId> {
        let guard = self.begin_navigation(message_id)?;
        self.switch_branch_with(&guard, target_index).await
    }

    /// [`switch_branch`](Self::switch_branch) under a guard already held.
    pub async fn switch_branch_with(
        &self,
        guard: &NavigationGuard,
        target_index: usize,
    ) -> Result<BranchId> {
        let message_id = guard.message_id();
        let branch_id = self
            .branches
            .get(message_id)
            .and_then(|projection| projection.get(target_index).map(|branch| branch.id.clone()))
            .ok_or_else(|| {
                NavigationError::TargetNotFound(format!(
                    "branch index {target_index} of message {message_id}"
                ))
            })?;

        self.send_branch_switch(message_id, branch_id).await
    }

    async fn send_branch_switch(
        &self,
        message_id: &MessageId,
        branch_id: BranchId,
    ) -> Result<BranchId> {
        let target = BranchTarget::Id(branch_id.clone());
        let response = self.backend.switch_branch(message_id, &target).await?;
        if !response.success {
            tracing::warn!(message_id = %message_id, branch_id = %branch_id, "Store refused branch switch");
            return Err(NavigationError::TargetNotFound(format!(
                "branch {branch_id} of message {message_id}"
            )));
        }

        tracing::info!(message_id = %message_id, branch_id = %branch_id, "Branch switched");
        Ok(branch_id)
    }

    /// Activate a version. The id must be in the current projection.
    pub async fn switch_version(
        &self,
        message_id: &MessageId,
        version_id: &VersionId,
    ) -> Result<VersionId> {
        let guard = self.begin_navigation(message_id)?;
        self.switch_version_with(&guard, version_id).await
    }

    pub async fn switch_version_with(
        &self,
        guard: &NavigationGuard,
        version_id: &VersionId,
    ) -> Result<VersionId> {
        let message_id = guard.message_id();
        let known = self
            .versions
            .get(message_id)
            .is_some_and(|projection| projection.index_of(version_id).is_some());
        if !known {
            return Err(NavigationError::TargetNotFound(format!(
                "version {version_id} of message {message_id}"
            )));
        }

        let response = self.backend.switch_version(message_id, version_id).await?;
        if !response.success {
            tracing::warn!(message_id = %message_id, version_id = %version_id, "Store refused version switch");
            return Err(NavigationError::TargetNotFound(format!(
                "version {version_id} of message {message_id}"
            )));
        }

        tracing::info!(message_id = %message_id, version_id = %version_id, "Version switched");
        Ok(version_id.clone())
    }

    /// Edit a message. The store appends exactly one branch.
    pub async fn edit_message(&self, message_id: &MessageId, content: &str) -> Result<BranchId> {
        self.pending.insert(
            message_id.clone(),
            PendingMutation::Edit {
                content: content.to_string(),
            },
        );
        let result = self.backend.edit_message(message_id, content).await;
        self.pending.remove(message_id);

        let response = result?;
        tracing::info!(message_id = %message_id, new_branch_id = %response.new_branch_id, "Message edited");
        Ok(response.new_branch_id)
    }

    /// Retry a message. The store appends exactly one version.
    pub async fn retry_message(&self, message_id: &MessageId, model: &str) -> Result<VersionId> {
        self.pending.insert(
            message_id.clone(),
            PendingMutation::Retry {
                model: model.to_string(),
            },
        );
        let result = self.backend.retry_message(message_id, model).await;
        self.pending.remove(message_id);

        let response = result?;
        tracing::info!(message_id = %message_id, new_version_id = %response.new_version_id, model, "Message retried");
        Ok(response.new_version_id)
    }
}
