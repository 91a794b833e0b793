//! Remote issue-tracker clients.
//!
//! Provides:
//! - `GhClient` - GitHub access through the `gh` CLI
//! - `MemoryTracker` - In-process tracker for tests and local experiments
//! - `OfflineTracker` - Refuses every call; sync paths treat that as a warning
//! - `gh api` command building utilities

pub mod command;
pub mod github;
#[cfg(feature = "memory")]
pub mod memory;
pub mod offline;

pub use command::{ApiRequest, CommandBuildError, GhCommand, Invocation};
pub use github::GhClient;
#[cfg(feature = "memory")]
pub use memory::MemoryTracker;
pub use offline::OfflineTracker;
