use async_trait::async_trait;
use chat_core::{BranchSnapshot, MessageId, ResumeResponse, VersionId, VersionSnapshot};

use crate::api::models::{BranchTarget, EditResponse, RetryResponse, SwitchResponse};
use crate::error::Result;

/// Resume endpoint consumed by the resumable stream client.
#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// Content past `from_position`. Must be response-idempotent for positions
    /// at or past the store's current position.
    async fn resume_stream(
        &self,
        message_id: &MessageId,
        from_position: u64,
    ) -> Result<ResumeResponse>;

    /// Idempotent.
    async fn mark_stream_complete(&self, message_id: &MessageId) -> Result<()>;
}

/// Branch and version queries and mutations.
///
/// The store is the sole writer: edits always append a branch, retries always
/// append a version.
#[async_trait]
pub trait BranchBackend: Send + Sync {
    async fn get_message_branches(&self, message_id: &MessageId) -> Result<BranchSnapshot>;

    async fn get_message_versions(&self, message_id: &MessageId) -> Result<VersionSnapshot>;

    async fn switch_branch(
        &self,
        message_id: &MessageId,
        target: &BranchTarget,
    ) -> Result<SwitchResponse>;

    async fn switch_version(
        &self,
        message_id: &MessageId,
        version_id: &VersionId,
    ) -> Result<SwitchResponse>;

    async fn edit_message(&self, message_id: &MessageId, new_content: &str)
        -> Result<EditResponse>;

    async fn retry_message(&self, message_id: &MessageId, model: &str) -> Result<RetryResponse>;
}

/// A store offering every contract.
pub trait ChatBackend: StreamBackend + BranchBackend {}

impl<T: StreamBackend + BranchBackend + ?Sized> ChatBackend for T {}
