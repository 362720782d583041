//! chat_core - Core types shared by the streaming and navigation crates
//!
//! This crate provides the foundational types used across the workspace:
//! - `ids` - opaque identifiers handed out by the external store
//! - `message` - Message nodes and roles
//! - `branch` / `version` - alternative contents of a message
//! - `stream` - resume endpoint payloads
//! - `config` / `paths` - configuration loading

pub mod branch;
pub mod config;
pub mod ids;
pub mod message;
pub mod paths;
pub mod stream;
pub mod version;

// Re-export commonly used types
pub use branch::{Branch, BranchSnapshot};
pub use config::{Config, ProxyAuth};
pub use ids::{BranchId, MessageId, VersionId};
pub use message::{Message, Role};
pub use stream::ResumeResponse;
pub use version::{Version, VersionSnapshot};
