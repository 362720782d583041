//! State transitions - FSM transition logic
//!
//! Implements the state machine that drives a stream session.

use thiserror::Error;

use super::events::StreamEvent;
use super::states::StreamState;

/// Error type for invalid state transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} with event {event}")]
    InvalidTransition { from: StreamState, event: String },

    #[error("State machine is in terminal state: {0:?}")]
    TerminalState(StreamState),
}

/// Represents a state transition result.
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// The state before the transition.
    pub from: StreamState,
    /// The state after the transition.
    pub to: StreamState,
    /// The event that triggered the transition.
    pub event: StreamEvent,
    /// Whether the state actually changed.
    pub changed: bool,
}

/// State machine for one stream session.
#[derive(Debug, Clone)]
pub struct StreamStateMachine {
    /// Current state.
    current_state: StreamState,
    /// Transition history (limited).
    history: Vec<StateTransition>,
    /// Max history entries to keep.
    max_history: usize,
}

impl Default for StreamStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamStateMachine {
    /// Create a new state machine in Idle state.
    pub fn new() -> Self {
        Self::with_state(StreamState::Idle)
    }

    /// Create a state machine with a specific initial state.
    pub fn with_state(state: StreamState) -> Self {
        Self {
            current_state: state,
            history: Vec::new(),
            max_history: 50,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> &StreamState {
        &self.current_state
    }

    /// Get the transition history.
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Handle an event and transition to a new state.
    pub fn handle_event(&mut self, event: StreamEvent) -> Result<StateTransition, TransitionError> {
        let old_state = self.current_state.clone();
        let new_state = Self::compute_next_state(&old_state, &event)?;
        let changed = old_state != new_state;

        if changed {
            tracing::debug!(
                from = ?old_state,
                to = ?new_state,
                event = event.name(),
                "Stream state transition"
            );
        }

        self.current_state = new_state.clone();

        let transition = StateTransition {
            from: old_state,
            to: new_state,
            event,
            changed,
        };

        // Add to history
        self.history.push(transition.clone());
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }

        Ok(transition)
    }

    /// Compute the next state given current state and event.
    fn compute_next_state(
        state: &StreamState,
        event: &StreamEvent,
    ) -> Result<StreamState, TransitionError> {
        use StreamEvent::*;
        use StreamState::*;

        let next = match (state, event) {
            // ========== Terminal ==========
            (Complete, _) => return Err(TransitionError::TerminalState(state.clone())),

            // ========== Activation ==========
            (Idle, Activated) => Streaming,

            // ========== Resume responses ==========
            (Streaming | Resuming, DeltaMerged { .. }) => Streaming,
            (Streaming | Resuming, Completed { .. }) => Complete,

            // ========== Failures ==========
            (Streaming | Resuming, TransportFailed { error }) => Error {
                message: error.clone(),
                fatal: false,
                failed_at: chrono::Utc::now().to_rfc3339(),
            },
            (Streaming | Resuming, ProtocolViolation { error }) => Error {
                message: error.clone(),
                fatal: true,
                failed_at: chrono::Utc::now().to_rfc3339(),
            },

            // ========== Manual retry ==========
            // A live session may be retried to supersede a stuck call.
            (Streaming | Resuming, ManualRetry) => Resuming,
            (Error { fatal: false, .. }, ManualRetry) => Resuming,

            // ========== Cancellation ==========
            (Idle | Streaming | Resuming | Error { .. }, Cancelled) => Idle,

            _ => {
                return Err(TransitionError::InvalidTransition {
                    from: state.clone(),
                    event: event.name().to_string(),
                })
            }
        };

        Ok(next)
    }

    /// Check if a transition is valid without executing it.
    pub fn can_transition(&self, event: &StreamEvent) -> bool {
        Self::compute_next_state(&self.current_state, event).is_ok()
    }

    /// Reset to Idle state, clearing history.
    pub fn reset(&mut self) {
        self.current_state = StreamState::Idle;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport_failure() -> StreamEvent {
        StreamEvent::TransportFailed {
            error: "connection reset".to_string(),
        }
    }

    #[test]
    fn test_basic_flow() {
        let mut sm = StreamStateMachine::new();
        assert_eq!(sm.state(), &StreamState::Idle);

        let t1 = sm.handle_event(StreamEvent::Activated).unwrap();
        assert!(t1.changed);
        assert_eq!(sm.state(), &StreamState::Streaming);

        let t2 = sm
            .handle_event(StreamEvent::DeltaMerged { position: 6 })
            .unwrap();
        assert!(!t2.changed);

        sm.handle_event(StreamEvent::Completed { position: 11 })
            .unwrap();
        assert_eq!(sm.state(), &StreamState::Complete);
    }

    #[test]
    fn test_complete_is_terminal() {
        let mut sm = StreamStateMachine::with_state(StreamState::Complete);
        let err = sm
            .handle_event(StreamEvent::DeltaMerged { position: 1 })
            .unwrap_err();
        assert!(matches!(err, TransitionError::TerminalState(_)));
        assert!(!sm.can_transition(&StreamEvent::ManualRetry));
    }

    #[test]
    fn test_transport_error_recovers_only_by_manual_retry() {
        let mut sm = StreamStateMachine::with_state(StreamState::Streaming);
        sm.handle_event(transport_failure()).unwrap();
        assert!(sm.state().is_recoverable_error());

        // A late response is not a way back out of error.
        assert!(!sm.can_transition(&StreamEvent::DeltaMerged { position: 2 }));

        sm.handle_event(StreamEvent::ManualRetry).unwrap();
        assert_eq!(sm.state(), &StreamState::Resuming);

        sm.handle_event(StreamEvent::DeltaMerged { position: 4 })
            .unwrap();
        assert_eq!(sm.state(), &StreamState::Streaming);
    }

    #[test]
    fn test_protocol_violation_is_fatal() {
        let mut sm = StreamStateMachine::with_state(StreamState::Resuming);
        sm.handle_event(StreamEvent::ProtocolViolation {
            error: "position went backwards".to_string(),
        })
        .unwrap();
        assert!(sm.state().is_fatal_error());

        let err = sm.handle_event(StreamEvent::ManualRetry).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn test_cancel_from_live_states() {
        for state in [StreamState::Streaming, StreamState::Resuming] {
            let mut sm = StreamStateMachine::with_state(state);
            sm.handle_event(StreamEvent::Cancelled).unwrap();
            assert_eq!(sm.state(), &StreamState::Idle);
        }
    }

    #[test]
    fn test_history_tracking() {
        let mut sm = StreamStateMachine::new();
        sm.handle_event(StreamEvent::Activated).unwrap();
        sm.handle_event(transport_failure()).unwrap();

        assert_eq!(sm.history().len(), 2);
        sm.reset();
        assert!(sm.history().is_empty());
    }
}
