//! Stream session - client-local state of one streaming message

use std::fmt;

use chat_core::{MessageId, ResumeResponse};
use chat_state::{StreamEvent, StreamState, StreamStateMachine};

use crate::error::{Result, StreamError};
use crate::position::PositionTracker;

/// Per-activation tag. Responses carrying an older generation than the
/// session's current one are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// What a merged resume response did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Still streaming; `delta` may be empty.
    Advanced { delta: String },
    /// The store reported completion.
    Completed,
}

/// One message's in-progress content.
#[derive(Debug, Clone)]
pub struct StreamSession {
    message_id: MessageId,
    generation: Generation,
    tracker: PositionTracker,
    machine: StreamStateMachine,
    last_error: Option<StreamError>,
}

impl StreamSession {
    /// Create an activated session at position 0.
    pub fn start(message_id: MessageId, generation: Generation) -> Result<Self> {
        let mut machine = StreamStateMachine::new();
        machine.handle_event(StreamEvent::Activated)?;
        Ok(Self {
            message_id,
            generation,
            tracker: PositionTracker::new(),
            machine,
            last_error: None,
        })
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn position(&self) -> u64 {
        self.tracker.position()
    }

    pub fn content(&self) -> &str {
        self.tracker.buffer()
    }

    pub fn state(&self) -> &StreamState {
        self.machine.state()
    }

    pub fn last_error(&self) -> Option<&StreamError> {
        self.last_error.as_ref()
    }

    /// Merge one resume response.
    ///
    /// A position violation moves the session into a fatal error and is
    /// returned as `Err`; the buffer is left as it was.
    pub fn apply(&mut self, response: &ResumeResponse) -> Result<MergeOutcome> {
        if let Err(err) = self.tracker.apply(&response.delta, response.new_position) {
            self.fail(err.clone())?;
            return Err(err);
        }

        let position = self.tracker.position();
        if response.is_complete {
            self.machine
                .handle_event(StreamEvent::Completed { position })?;
            return Ok(MergeOutcome::Completed);
        }

        self.machine
            .handle_event(StreamEvent::DeltaMerged { position })?;
        Ok(MergeOutcome::Advanced {
            delta: response.delta.clone(),
        })
    }

    /// Record a failure. Content and position are kept.
    pub fn fail(&mut self, error: StreamError) -> Result<()> {
        let event = if error.is_fatal() {
            StreamEvent::ProtocolViolation {
                error: error.to_string(),
            }
        } else {
            StreamEvent::TransportFailed {
                error: error.to_string(),
            }
        };
        self.machine.handle_event(event)?;
        self.last_error = Some(error);
        Ok(())
    }

    /// Manual retry: continue from the retained position under a new
    /// generation, so responses still in flight for the old one are ignored.
    pub fn supersede(&mut self, generation: Generation) -> Result<()> {
        self.machine.handle_event(StreamEvent::ManualRetry)?;
        self.generation = generation;
        self.last_error = None;
        Ok(())
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            message_id: self.message_id.clone(),
            generation: self.generation,
            content: self.tracker.buffer().to_string(),
            position: self.tracker.position(),
            state: self.machine.state().clone(),
            is_streaming: self.machine.state().is_streaming(),
            error: self.last_error.clone(),
        }
    }
}

/// What a view renders for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSnapshot {
    pub message_id: MessageId,
    pub generation: Generation,
    pub content: String,
    pub position: u64,
    pub state: StreamState,
    pub is_streaming: bool,
    /// Set while the session is in error; shown as a persistent banner.
    pub error: Option<StreamError>,
}

impl StreamSnapshot {
    pub fn is_complete(&self) -> bool {
        self.state.is_terminal()
    }
}
