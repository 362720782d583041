//! chat_state - State machine for stream sessions
//!
//! This crate provides the state machine that governs one stream session:
//! `idle → streaming → {resuming ⇄ streaming} → complete`, with `error`
//! reachable from `streaming`/`resuming`.

pub mod machine;

// Re-export commonly used types
pub use machine::{StateTransition, StreamEvent, StreamState, StreamStateMachine, TransitionError};
