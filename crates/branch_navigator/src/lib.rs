//! branch_navigator - navigation between alternative message contents
//!
//! - [`BranchVersionStore`] projects branch and version snapshots into sorted,
//!   zero-indexed sequences and issues switch/edit/retry mutations
//! - [`BranchNavigator`] renders `i/n` views, steps cyclically and cancels
//!   stream sessions that a switch makes stale
//! - [`DeepLinkResolver`] follows an external locator to a message and branch

pub mod deep_link;
pub mod error;
pub mod navigator;
pub mod projection;
pub mod store;

pub use deep_link::{DeepLinkResolver, MessageLocator, Resolution};
pub use error::{DeepLinkError, NavigationError, NavigationErrorKind, Result};
pub use navigator::{BranchNavigator, NavigationAxis, NavigationOutcome, NavigatorView};
pub use projection::{next_index, BranchProjection, Direction, VersionProjection};
pub use store::{BranchVersionStore, NavigationGuard, PendingMutation};
