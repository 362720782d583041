//! chat_client - bindings to the external chat store
//!
//! The streaming and navigation engines never own persistence. Everything they
//! need from the store goes through the traits in [`client_trait`]:
//! - [`HttpChatClient`] talks to a store over HTTP
//! - [`InMemoryChatStore`] is an in-process store used by tests and demos

pub mod api;
pub mod client_trait;
pub mod error;
pub mod memory;
pub mod utils;

pub use api::client::HttpChatClient;
pub use api::models::{BranchTarget, EditResponse, RetryResponse, SwitchResponse};
pub use chat_core::Config;
pub use client_trait::{BranchBackend, ChatBackend, StreamBackend};
pub use error::{BackendError, Result};
pub use memory::{InMemoryChatStore, StoreSignal};
