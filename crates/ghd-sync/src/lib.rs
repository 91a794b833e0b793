//! Sync, wait and discussion orchestration for ghd.
//!
//! Provides:
//! - `marker` - Agent marker encode/decode for remote comment bodies
//! - `SyncEngine` - Import remote comments, push local messages
//! - `watch` - Filesystem-notified waits on a session
//! - `Discussion` - The operations behind each `ghd` command

pub mod discussion;
pub mod engine;
pub mod error;
pub mod marker;
pub mod watch;

pub use discussion::{Discussion, SendReport, StartReport};
pub use engine::{SyncEngine, import_remote};
pub use error::SyncError;
pub use watch::{WaitOutcome, wait_for_next, wait_for_other_cursor_change};
