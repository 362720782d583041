//! Resumable stream client
//!
//! Drives one poll loop per active message against the store's resume
//! endpoint. The loop is the only writer of its session; results are applied
//! in the order responses resolve and only if the response's generation still
//! owns the session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chat_client::StreamBackend;
use chat_core::{MessageId, ResumeResponse};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::StreamClientConfig;
use crate::error::{Result, StreamError};
use crate::events::StreamUpdate;
use crate::session::{Generation, MergeOutcome, StreamSession, StreamSnapshot};

struct SessionSlot {
    session: StreamSession,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SessionTable {
    /// Sessions in streaming, resuming or error state.
    live: HashMap<MessageId, SessionSlot>,
    /// Final content of completed streams, readable until the message is
    /// deactivated or activated again.
    finished: HashMap<MessageId, StreamSnapshot>,
}

struct Shared {
    backend: Arc<dyn StreamBackend>,
    config: StreamClientConfig,
    sessions: RwLock<SessionTable>,
    next_generation: AtomicU64,
    updates: broadcast::Sender<StreamUpdate>,
}

/// How the poll loop continues after a response was handled.
enum Step {
    Continue,
    Complete,
    Stop,
}

/// Reconstructs in-progress message content across interruptions.
#[derive(Clone)]
pub struct ResumableStreamClient {
    shared: Arc<Shared>,
}

impl ResumableStreamClient {
    pub fn new(backend: Arc<dyn StreamBackend>, config: StreamClientConfig) -> Self {
        let (updates, _) = broadcast::channel(config.update_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                backend,
                config,
                sessions: RwLock::new(SessionTable::default()),
                next_generation: AtomicU64::new(1),
                updates,
            }),
        }
    }

    /// Subscribe to content, completion and failure updates.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamUpdate> {
        self.shared.updates.subscribe()
    }

    /// Start a session for `message_id`, resuming from position 0.
    ///
    /// Idempotent while a session is live: the existing generation is
    /// returned and no second poll loop is started. A completed stream is
    /// terminal; its generation is returned without polling. Use
    /// [`restart`](Self::restart) or `deactivate` to poll it again.
    pub async fn activate(&self, message_id: &MessageId) -> Result<Generation> {
        let mut table = self.shared.sessions.write().await;
        if let Some(slot) = table.live.get(message_id) {
            tracing::debug!(
                message_id = %message_id,
                generation = %slot.session.generation(),
                "Stream session already active"
            );
            return Ok(slot.session.generation());
        }
        if let Some(snapshot) = table.finished.get(message_id) {
            tracing::debug!(
                message_id = %message_id,
                generation = %snapshot.generation,
                "Stream already complete, not polling again"
            );
            return Ok(snapshot.generation);
        }

        let generation = self.start_session(&mut table, message_id)?;
        tracing::info!(message_id = %message_id, generation = %generation, "Stream session activated");
        Ok(generation)
    }

    /// Stop polling and discard the session. Responses still in flight are
    /// dropped by the generation check.
    pub async fn deactivate(&self, message_id: &MessageId) -> bool {
        let mut table = self.shared.sessions.write().await;
        table.finished.remove(message_id);
        let Some(slot) = table.live.remove(message_id) else {
            return false;
        };
        drop(table);

        slot.cancel.cancel();
        let generation = slot.session.generation();
        tracing::info!(
            message_id = %message_id,
            generation = %generation,
            position = slot.session.position(),
            "Stream session deactivated"
        );
        let _ = self.shared.updates.send(StreamUpdate::Cancelled {
            message_id: message_id.clone(),
            generation,
        });
        true
    }

    /// Manual retry.
    ///
    /// - after a transport error, resumes from the last known position;
    /// - while a call is still pending, supersedes it with a new generation;
    /// - after a position violation, restarts from position 0.
    pub async fn retry(&self, message_id: &MessageId) -> Result<Generation> {
        let mut table = self.shared.sessions.write().await;
        let fatal = match table.live.get(message_id) {
            Some(slot) => slot.session.state().is_fatal_error(),
            None => return Err(StreamError::NoSession(message_id.clone())),
        };
        if fatal {
            drop(table);
            return self.restart(message_id).await;
        }

        let generation = self.next_generation();
        let cancel = CancellationToken::new();
        let slot = table
            .live
            .get_mut(message_id)
            .ok_or_else(|| StreamError::NoSession(message_id.clone()))?;
        slot.session.supersede(generation)?;
        let previous = std::mem::replace(&mut slot.cancel, cancel.clone());
        previous.cancel();
        let position = slot.session.position();
        drop(table);

        tracing::info!(
            message_id = %message_id,
            generation = %generation,
            position,
            "Retrying stream session"
        );
        self.spawn_poll_loop(message_id.clone(), generation, cancel);
        Ok(generation)
    }

    /// Discard any session for `message_id` and start over from position 0.
    pub async fn restart(&self, message_id: &MessageId) -> Result<Generation> {
        let mut table = self.shared.sessions.write().await;
        table.finished.remove(message_id);
        if let Some(old) = table.live.remove(message_id) {
            old.cancel.cancel();
            let _ = self.shared.updates.send(StreamUpdate::Cancelled {
                message_id: message_id.clone(),
                generation: old.session.generation(),
            });
        }

        let generation = self.start_session(&mut table, message_id)?;
        tracing::info!(message_id = %message_id, generation = %generation, "Stream session restarted");
        Ok(generation)
    }

    /// Current `(content, is_streaming, error)` of a message, if known.
    pub async fn snapshot(&self, message_id: &MessageId) -> Option<StreamSnapshot> {
        let table = self.shared.sessions.read().await;
        table
            .live
            .get(message_id)
            .map(|slot| slot.session.snapshot())
            .or_else(|| table.finished.get(message_id).cloned())
    }

    /// Whether resume calls are being issued for `message_id`.
    pub async fn is_streaming(&self, message_id: &MessageId) -> bool {
        let table = self.shared.sessions.read().await;
        table
            .live
            .get(message_id)
            .is_some_and(|slot| slot.session.state().is_streaming())
    }

    /// Whether a session (streaming or in error) exists for `message_id`.
    pub async fn has_session(&self, message_id: &MessageId) -> bool {
        self.shared.sessions.read().await.live.contains_key(message_id)
    }

    pub async fn active_sessions(&self) -> Vec<MessageId> {
        self.shared
            .sessions
            .read()
            .await
            .live
            .keys()
            .cloned()
            .collect()
    }

    fn next_generation(&self) -> Generation {
        Generation::new(self.shared.next_generation.fetch_add(1, Ordering::SeqCst))
    }

    fn start_session(&self, table: &mut SessionTable, message_id: &MessageId) -> Result<Generation> {
        let generation = self.next_generation();
        let session = StreamSession::start(message_id.clone(), generation)?;
        let cancel = CancellationToken::new();
        table.live.insert(
            message_id.clone(),
            SessionSlot {
                session,
                cancel: cancel.clone(),
            },
        );
        self.spawn_poll_loop(message_id.clone(), generation, cancel);
        Ok(generation)
    }

    fn spawn_poll_loop(
        &self,
        message_id: MessageId,
        generation: Generation,
        cancel: CancellationToken,
    ) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            shared.poll_loop(message_id, generation, cancel).await;
        });
    }
}

impl Shared {
    async fn poll_loop(
        &self,
        message_id: MessageId,
        generation: Generation,
        cancel: CancellationToken,
    ) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let Some(from_position) = self.position_for(&message_id, generation).await else {
                return;
            };

            tracing::debug!(
                message_id = %message_id,
                generation = %generation,
                from_position,
                "Resuming stream"
            );
            // Not raced against cancellation: a late response is discarded by
            // the generation check in `handle_response`.
            let result = self.backend.resume_stream(&message_id, from_position).await;

            match self.handle_response(&message_id, generation, result).await {
                Step::Continue => {}
                Step::Complete => {
                    self.mark_complete(&message_id).await;
                    return;
                }
                Step::Stop => return,
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    async fn position_for(&self, message_id: &MessageId, generation: Generation) -> Option<u64> {
        let table = self.sessions.read().await;
        table
            .live
            .get(message_id)
            .filter(|slot| slot.session.generation() == generation)
            .map(|slot| slot.session.position())
    }

    async fn handle_response(
        &self,
        message_id: &MessageId,
        generation: Generation,
        result: std::result::Result<ResumeResponse, chat_client::BackendError>,
    ) -> Step {
        let mut table = self.sessions.write().await;
        let Some(slot) = table
            .live
            .get_mut(message_id)
            .filter(|slot| slot.session.generation() == generation)
        else {
            tracing::warn!(
                message_id = %message_id,
                generation = %generation,
                "Discarding resume response for superseded session"
            );
            return Step::Stop;
        };

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                let error = StreamError::from(err);
                tracing::warn!(
                    message_id = %message_id,
                    generation = %generation,
                    position = slot.session.position(),
                    error = %error,
                    "Resume call failed, waiting for manual retry"
                );
                if let Err(state_err) = slot.session.fail(error.clone()) {
                    tracing::warn!(message_id = %message_id, error = %state_err, "Could not record failure");
                }
                self.publish(StreamUpdate::Failed {
                    message_id: message_id.clone(),
                    generation,
                    error,
                });
                return Step::Stop;
            }
        };

        match slot.session.apply(&response) {
            Ok(MergeOutcome::Advanced { delta }) => {
                if !delta.is_empty() {
                    self.publish(StreamUpdate::ContentUpdated {
                        message_id: message_id.clone(),
                        generation,
                        delta,
                        content: slot.session.content().to_string(),
                        position: slot.session.position(),
                    });
                }
                Step::Continue
            }
            Ok(MergeOutcome::Completed) => {
                let snapshot = slot.session.snapshot();
                table.live.remove(message_id);
                tracing::info!(
                    message_id = %message_id,
                    generation = %generation,
                    position = snapshot.position,
                    "Stream complete"
                );
                self.publish(StreamUpdate::Completed {
                    message_id: message_id.clone(),
                    generation,
                    content: snapshot.content.clone(),
                    position: snapshot.position,
                });
                table.finished.insert(message_id.clone(), snapshot);
                Step::Complete
            }
            Err(error) => {
                tracing::error!(
                    message_id = %message_id,
                    generation = %generation,
                    error = %error,
                    "Stream out of sync with store, restart required"
                );
                self.publish(StreamUpdate::Failed {
                    message_id: message_id.clone(),
                    generation,
                    error,
                });
                Step::Stop
            }
        }
    }

    async fn mark_complete(&self, message_id: &MessageId) {
        if let Err(err) = self.backend.mark_stream_complete(message_id).await {
            tracing::warn!(message_id = %message_id, error = %err, "Failed to mark stream complete");
        }
    }

    fn publish(&self, update: StreamUpdate) {
        // No receivers is fine; views may poll snapshots instead.
        let _ = self.updates.send(update);
    }
}
