//! Wire types for store mutations

use chat_core::{BranchId, VersionId};
use serde::{Deserialize, Serialize};

/// Addresses a branch either by its position among siblings or by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchTarget {
    Index(usize),
    Id(BranchId),
}

impl std::fmt::Display for BranchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(index) => write!(f, "index {index}"),
            Self::Id(id) => write!(f, "branch {id}"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwitchBranchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<BranchId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_index: Option<usize>,
}

impl From<&BranchTarget> for SwitchBranchRequest {
    fn from(target: &BranchTarget) -> Self {
        match target {
            BranchTarget::Index(index) => Self {
                branch_index: Some(*index),
                ..Default::default()
            },
            BranchTarget::Id(id) => Self {
                branch_id: Some(id.clone()),
                ..Default::default()
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwitchVersionRequest {
    pub version_id: VersionId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RetryRequest {
    pub model: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchResponse {
    pub success: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EditResponse {
    pub new_branch_id: BranchId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetryResponse {
    pub new_version_id: VersionId,
}
