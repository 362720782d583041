//! State machine module
//!
//! Contains the FSM implementation for the stream session lifecycle.

mod events;
mod states;
mod transitions;

pub use events::StreamEvent;
pub use states::StreamState;
pub use transitions::{StateTransition, StreamStateMachine, TransitionError};
