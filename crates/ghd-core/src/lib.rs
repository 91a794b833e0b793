//! Core building blocks for ghd discussions.
//!
//! This crate provides:
//! - `GhdConfig` - Store location and remote client settings
//! - `LocalMessage` - One durable contribution and its on-disk format
//! - `MessageStore` - Append-only, file-per-message log with atomic sequencing
//! - `IssueTracker` - The remote issue-thread seam

pub mod config;
pub mod fs;
pub mod message;
pub mod msg_store;
pub mod traits;

pub use config::GhdConfig;
pub use message::{LocalMessage, MessageDraft, is_valid_agent_name, normalize_role};
pub use msg_store::{MessageStore, StoreError, StoreGuard};
pub use traits::{IssueTracker, RemoteComment, RemoteError, RemoteIssue};
