//! In-process reference store
//!
//! Implements every store contract against in-memory tables. It follows the
//! same append-only discipline as a real store: edits append a branch, retries
//! append a version, nothing is mutated in place. Changes are announced as
//! lightweight [`StoreSignal`]s; subscribers pull fresh snapshots afterwards.

mod signals;
mod store;

pub use signals::StoreSignal;
pub use store::InMemoryChatStore;
