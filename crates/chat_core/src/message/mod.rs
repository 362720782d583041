//! Message module - conversation nodes
//!
//! A message never carries its own content once branches or versions exist;
//! content is resolved through the active branch/version.

mod node;
mod role;

pub use node::Message;
pub use role::Role;
