//! Navigable projections of subscription snapshots
//!
//! Payload order is not stable across updates, so both projections re-sort:
//! branches by their immutable `ordinal`, versions by `created_at`. The
//! active index is recomputed against the sorted order.

use chat_core::{Branch, BranchId, BranchSnapshot, MessageId, Version, VersionId, VersionSnapshot};

/// Navigation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

/// Target index for a step in `direction`.
///
/// Wraps circularly: `Next` past the last index yields `0`, `Prev` from `0`
/// yields `length - 1`. An empty sequence always yields `0`.
pub fn next_index(current: usize, length: usize, direction: Direction) -> usize {
    if length == 0 {
        return 0;
    }
    let current = current % length;
    match direction {
        Direction::Next => (current + 1) % length,
        Direction::Prev => (current + length - 1) % length,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchProjection {
    pub branches: Vec<Branch>,
    pub active_index: Option<usize>,
}

impl BranchProjection {
    pub fn from_snapshot(message_id: &MessageId, snapshot: BranchSnapshot) -> Self {
        let hinted = snapshot
            .active_index_hint()
            .map(|index| snapshot.branches[index].id.clone());

        let mut branches = snapshot.branches;
        branches.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.id.cmp(&b.id)));

        let active_count = branches.iter().filter(|branch| branch.is_active).count();
        if active_count > 1 {
            tracing::warn!(
                message_id = %message_id,
                active_count,
                "Several branches flagged active, using the lowest ordinal"
            );
        }

        let active_index = branches
            .iter()
            .position(|branch| branch.is_active)
            .or_else(|| hinted.and_then(|id| branches.iter().position(|b| b.id == id)));

        Self {
            branches,
            active_index,
        }
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Branch> {
        self.branches.get(index)
    }

    pub fn active(&self) -> Option<&Branch> {
        self.active_index.and_then(|index| self.branches.get(index))
    }

    pub fn index_of(&self, branch_id: &BranchId) -> Option<usize> {
        self.branches.iter().position(|branch| &branch.id == branch_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionProjection {
    pub versions: Vec<Version>,
    pub active_index: Option<usize>,
}

impl VersionProjection {
    pub fn from_snapshot(message_id: &MessageId, snapshot: VersionSnapshot) -> Self {
        let hinted = snapshot
            .active_index_hint()
            .map(|index| snapshot.versions[index].version_id.clone());

        let mut versions = snapshot.versions;
        versions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.version_id.cmp(&b.version_id))
        });

        if versions.iter().filter(|version| version.is_active).count() > 1 {
            tracing::warn!(message_id = %message_id, "Several versions flagged active, using the oldest");
        }

        let active_index = versions
            .iter()
            .position(|version| version.is_active)
            .or_else(|| hinted.and_then(|id| versions.iter().position(|v| v.version_id == id)));

        Self {
            versions,
            active_index,
        }
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Version> {
        self.versions.get(index)
    }

    pub fn active(&self) -> Option<&Version> {
        self.active_index.and_then(|index| self.versions.get(index))
    }

    pub fn index_of(&self, version_id: &VersionId) -> Option<usize> {
        self.versions
            .iter()
            .position(|version| &version.version_id == version_id)
    }
}
