use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chat_core::{
    Branch, BranchId, BranchSnapshot, Message, MessageId, ResumeResponse, Role, Version,
    VersionId, VersionSnapshot,
};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{mpsc, Mutex};

use super::signals::StoreSignal;
use crate::api::models::{BranchTarget, EditResponse, RetryResponse, SwitchResponse};
use crate::client_trait::{BranchBackend, StreamBackend};
use crate::error::{BackendError, Result};

const DEFAULT_MODEL: &str = "default";

#[derive(Debug)]
struct BranchRecord {
    branch: Branch,
    content: String,
}

#[derive(Debug, Default)]
struct StreamRecord {
    content: String,
    position: u64,
    complete: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    messages: HashMap<MessageId, Message>,
    /// Creation order.
    branches: HashMap<MessageId, Vec<BranchRecord>>,
    /// Creation order.
    versions: HashMap<MessageId, Vec<Version>>,
    streams: HashMap<MessageId, StreamRecord>,
    failing_resumes: usize,
    last_created_at: Option<DateTime<Utc>>,
}

impl StoreState {
    fn message(&self, message_id: &MessageId) -> Result<&Message> {
        self.messages
            .get(message_id)
            .ok_or_else(|| BackendError::NotFound(format!("message {message_id}")))
    }

    fn message_mut(&mut self, message_id: &MessageId) -> Result<&mut Message> {
        self.messages
            .get_mut(message_id)
            .ok_or_else(|| BackendError::NotFound(format!("message {message_id}")))
    }

    /// Strictly increasing creation timestamps, so creation order survives
    /// sorting by `created_at`.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let created_at = match self.last_created_at {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_created_at = Some(created_at);
        created_at
    }

    fn push_branch(&mut self, message_id: &MessageId, content: &str) -> BranchId {
        let records = self.branches.entry(message_id.clone()).or_default();
        let ordinal = records
            .iter()
            .map(|record| record.branch.ordinal + 1)
            .max()
            .unwrap_or(0);
        for record in records.iter_mut() {
            record.branch.is_active = false;
        }

        let branch_id = BranchId::generate();
        records.push(BranchRecord {
            branch: Branch {
                id: branch_id.clone(),
                fork_point_message_id: message_id.clone(),
                ordinal,
                is_active: true,
            },
            content: content.to_string(),
        });

        if let Some(message) = self.messages.get_mut(message_id) {
            message.active_branch_id = Some(branch_id.clone());
        }
        branch_id
    }

    fn push_version(&mut self, message_id: &MessageId, content: &str, model: &str) -> VersionId {
        let created_at = self.next_created_at();
        let versions = self.versions.entry(message_id.clone()).or_default();
        for version in versions.iter_mut() {
            version.is_active = false;
        }

        let version_id = VersionId::generate();
        versions.push(Version {
            version_id: version_id.clone(),
            message_id: message_id.clone(),
            content: content.to_string(),
            model: model.to_string(),
            created_at,
            is_active: true,
        });

        if let Some(message) = self.messages.get_mut(message_id) {
            message.active_version_id = Some(version_id.clone());
        }
        version_id
    }
}

/// In-process chat store.
///
/// Snapshots are reported newest first, so consumers relying on payload order
/// instead of `ordinal`/`createdAt` are caught by tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChatStore {
    state: Arc<Mutex<StoreState>>,
    subscribers: Arc<Mutex<Vec<mpsc::Sender<StoreSignal>>>>,
    resume_calls: Arc<AtomicUsize>,
    mark_complete_calls: Arc<AtomicUsize>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to change signals.
    pub async fn subscribe(&self) -> mpsc::Receiver<StoreSignal> {
        let (tx, rx) = mpsc::channel(64);
        self.subscribers.lock().await.push(tx);
        rx
    }

    async fn broadcast(&self, signal: StoreSignal) {
        let mut subscribers = self.subscribers.lock().await;
        // Remove disconnected subscribers and send to active ones
        subscribers.retain(|sender| match sender.try_send(signal.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(signal = ?signal, "Subscriber lagging, dropping store signal");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        tracing::trace!(
            signal = ?signal,
            active_subscribers = subscribers.len(),
            "Store signal broadcasted"
        );
    }

    /// Insert a user message with its root branch.
    pub async fn insert_user_message(&self, content: &str) -> MessageId {
        let message_id = MessageId::generate();
        let mut state = self.state.lock().await;
        state
            .messages
            .insert(message_id.clone(), Message::new(message_id.clone(), Role::User));
        state.push_branch(&message_id, content);
        message_id
    }

    /// Insert an assistant message with its first version.
    pub async fn insert_assistant_message(&self, content: &str, model: &str) -> MessageId {
        let message_id = MessageId::generate();
        let mut state = self.state.lock().await;
        state.messages.insert(
            message_id.clone(),
            Message::new(message_id.clone(), Role::Assistant),
        );
        state.push_version(&message_id, content, model);
        message_id
    }

    /// Start (or restart) the stream of a message with empty content.
    pub async fn begin_stream(&self, message_id: &MessageId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.message(message_id)?;
        state
            .streams
            .insert(message_id.clone(), StreamRecord::default());
        Ok(())
    }

    /// Append generated content to a stream and to the active version.
    pub async fn append_stream_chunk(&self, message_id: &MessageId, delta: &str) -> Result<u64> {
        let position = {
            let mut state = self.state.lock().await;
            let stream = state
                .streams
                .get_mut(message_id)
                .ok_or_else(|| BackendError::NotFound(format!("stream {message_id}")))?;
            if stream.complete {
                return Err(BackendError::Rejected(format!(
                    "stream {message_id} already complete"
                )));
            }
            stream.content.push_str(delta);
            stream.position += delta.chars().count() as u64;
            let position = stream.position;

            if let Some(version) = state
                .versions
                .get_mut(message_id)
                .and_then(|versions| versions.iter_mut().find(|v| v.is_active))
            {
                version.content.push_str(delta);
            }
            position
        };

        self.broadcast(StoreSignal::StreamAdvanced {
            message_id: message_id.clone(),
            position,
        })
        .await;
        Ok(position)
    }

    /// Mark the generation as finished; the next resume reports completion.
    pub async fn finish_stream(&self, message_id: &MessageId) -> Result<u64> {
        let position = {
            let mut state = self.state.lock().await;
            let stream = state
                .streams
                .get_mut(message_id)
                .ok_or_else(|| BackendError::NotFound(format!("stream {message_id}")))?;
            stream.complete = true;
            stream.position
        };

        self.broadcast(StoreSignal::StreamCompleted {
            message_id: message_id.clone(),
            position,
        })
        .await;
        Ok(position)
    }

    /// Delete a branch, as another client would.
    pub async fn remove_branch(&self, message_id: &MessageId, branch_id: &BranchId) -> bool {
        let removed = {
            let mut state = self.state.lock().await;
            match state.branches.get_mut(message_id) {
                Some(records) => {
                    let before = records.len();
                    records.retain(|record| &record.branch.id != branch_id);
                    before != records.len()
                }
                None => false,
            }
        };
        if removed {
            self.broadcast(StoreSignal::BranchesChanged {
                message_id: message_id.clone(),
            })
            .await;
        }
        removed
    }

    /// Delete a version, as another client would.
    pub async fn remove_version(&self, message_id: &MessageId, version_id: &VersionId) -> bool {
        let removed = {
            let mut state = self.state.lock().await;
            match state.versions.get_mut(message_id) {
                Some(versions) => {
                    let before = versions.len();
                    versions.retain(|version| &version.version_id != version_id);
                    before != versions.len()
                }
                None => false,
            }
        };
        if removed {
            self.broadcast(StoreSignal::VersionsChanged {
                message_id: message_id.clone(),
            })
            .await;
        }
        removed
    }

    /// Make the next `count` resume calls fail with a transport error.
    pub async fn fail_next_resumes(&self, count: usize) {
        self.state.lock().await.failing_resumes = count;
    }

    pub fn resume_calls(&self) -> usize {
        self.resume_calls.load(Ordering::SeqCst)
    }

    pub fn mark_complete_calls(&self) -> usize {
        self.mark_complete_calls.load(Ordering::SeqCst)
    }

    pub async fn message(&self, message_id: &MessageId) -> Option<Message> {
        self.state.lock().await.messages.get(message_id).cloned()
    }

    /// Content of the active branch of a fork point.
    pub async fn active_branch_content(&self, message_id: &MessageId) -> Option<String> {
        let state = self.state.lock().await;
        state
            .branches
            .get(message_id)?
            .iter()
            .find(|record| record.branch.is_active)
            .map(|record| record.content.clone())
    }
}

#[async_trait]
impl StreamBackend for InMemoryChatStore {
    async fn resume_stream(
        &self,
        message_id: &MessageId,
        from_position: u64,
    ) -> Result<ResumeResponse> {
        self.resume_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().await;
        if state.failing_resumes > 0 {
            state.failing_resumes -= 1;
            return Err(BackendError::Transport("connection reset by peer".to_string()));
        }

        let stream = state
            .streams
            .get(message_id)
            .ok_or_else(|| BackendError::NotFound(format!("stream {message_id}")))?;

        if from_position >= stream.position {
            return Ok(ResumeResponse::empty(from_position, stream.complete));
        }

        let delta: String = stream
            .content
            .chars()
            .skip(from_position as usize)
            .collect();
        Ok(ResumeResponse::new(delta, stream.position, stream.complete))
    }

    async fn mark_stream_complete(&self, message_id: &MessageId) -> Result<()> {
        self.mark_complete_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        let stream = state
            .streams
            .get_mut(message_id)
            .ok_or_else(|| BackendError::NotFound(format!("stream {message_id}")))?;
        stream.complete = true;
        Ok(())
    }
}

#[async_trait]
impl BranchBackend for InMemoryChatStore {
    async fn get_message_branches(&self, message_id: &MessageId) -> Result<BranchSnapshot> {
        let state = self.state.lock().await;
        state.message(message_id)?;

        let branches: Vec<Branch> = state
            .branches
            .get(message_id)
            .map(|records| records.iter().rev().map(|r| r.branch.clone()).collect())
            .unwrap_or_default();
        let active_index = branches
            .iter()
            .position(|branch| branch.is_active)
            .map(|index| index as i64)
            .unwrap_or(-1);

        Ok(BranchSnapshot {
            branches,
            active_index,
        })
    }

    async fn get_message_versions(&self, message_id: &MessageId) -> Result<VersionSnapshot> {
        let state = self.state.lock().await;
        state.message(message_id)?;

        let versions: Vec<Version> = state
            .versions
            .get(message_id)
            .map(|versions| versions.iter().rev().cloned().collect())
            .unwrap_or_default();
        let active_index = versions
            .iter()
            .position(|version| version.is_active)
            .map(|index| index as i64)
            .unwrap_or(-1);

        Ok(VersionSnapshot {
            versions,
            active_index,
        })
    }

    async fn switch_branch(
        &self,
        message_id: &MessageId,
        target: &BranchTarget,
    ) -> Result<SwitchResponse> {
        let switched = {
            let mut state = self.state.lock().await;
            state.message(message_id)?;

            let records = state.branches.entry(message_id.clone()).or_default();
            let target_id = match target {
                BranchTarget::Id(id) => records
                    .iter()
                    .find(|record| &record.branch.id == id)
                    .map(|record| record.branch.id.clone()),
                BranchTarget::Index(index) => {
                    let mut ordered: Vec<&BranchRecord> = records.iter().collect();
                    ordered.sort_by_key(|record| record.branch.ordinal);
                    ordered.get(*index).map(|record| record.branch.id.clone())
                }
            };

            match target_id {
                Some(target_id) => {
                    for record in records.iter_mut() {
                        record.branch.is_active = record.branch.id == target_id;
                    }
                    state.message_mut(message_id)?.active_branch_id = Some(target_id);
                    true
                }
                None => false,
            }
        };

        tracing::debug!(message_id = %message_id, target = %target, switched, "switch_branch");
        if switched {
            self.broadcast(StoreSignal::BranchesChanged {
                message_id: message_id.clone(),
            })
            .await;
        }
        Ok(SwitchResponse { success: switched })
    }

    async fn switch_version(
        &self,
        message_id: &MessageId,
        version_id: &VersionId,
    ) -> Result<SwitchResponse> {
        let switched = {
            let mut state = self.state.lock().await;
            state.message(message_id)?;

            let versions = state.versions.entry(message_id.clone()).or_default();
            if versions.iter().any(|v| &v.version_id == version_id) {
                for version in versions.iter_mut() {
                    version.is_active = &version.version_id == version_id;
                }
                state.message_mut(message_id)?.active_version_id = Some(version_id.clone());
                true
            } else {
                false
            }
        };

        tracing::debug!(message_id = %message_id, version_id = %version_id, switched, "switch_version");
        if switched {
            self.broadcast(StoreSignal::VersionsChanged {
                message_id: message_id.clone(),
            })
            .await;
        }
        Ok(SwitchResponse { success: switched })
    }

    async fn edit_message(
        &self,
        message_id: &MessageId,
        new_content: &str,
    ) -> Result<EditResponse> {
        let new_branch_id = {
            let mut state = self.state.lock().await;
            state.message(message_id)?;
            state.push_branch(message_id, new_content)
        };

        tracing::debug!(message_id = %message_id, new_branch_id = %new_branch_id, "edit_message");
        self.broadcast(StoreSignal::BranchesChanged {
            message_id: message_id.clone(),
        })
        .await;
        Ok(EditResponse { new_branch_id })
    }

    async fn retry_message(&self, message_id: &MessageId, model: &str) -> Result<RetryResponse> {
        let model = if model.is_empty() { DEFAULT_MODEL } else { model };
        let new_version_id = {
            let mut state = self.state.lock().await;
            state.message(message_id)?;
            let version_id = state.push_version(message_id, "", model);
            state
                .streams
                .insert(message_id.clone(), StreamRecord::default());
            version_id
        };

        tracing::debug!(message_id = %message_id, new_version_id = %new_version_id, "retry_message");
        self.broadcast(StoreSignal::VersionsChanged {
            message_id: message_id.clone(),
        })
        .await;
        Ok(RetryResponse { new_version_id })
    }
}
