//! stream_resume - resumable stream sessions
//!
//! Rebuilds one message's content across any number of interruptions by
//! polling the store's resume endpoint:
//! - [`position`] - the pure prefix merge
//! - [`session`] - per-message session state tagged with a generation
//! - [`client`] - the poll loop, manual retry and cancellation

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod position;
pub mod session;

pub use client::ResumableStreamClient;
pub use config::StreamClientConfig;
pub use error::{Result, StreamError, StreamErrorKind};
pub use events::StreamUpdate;
pub use position::{merge, PositionTracker};
pub use session::{Generation, StreamSession, StreamSnapshot};
