//! Sync and discussion errors.

use std::time::Duration;

use ghd_core::{RemoteError, StoreError};
use ghd_session::RegistryError;
use thiserror::Error;

/// Error from sync, wait or discussion operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Timed out after {}s without a new message", .waited.as_secs())]
    Timeout { waited: Duration },
    #[error("File watcher failed: {0}")]
    Watch(#[from] notify::Error),
    #[error("{0}")]
    InvalidArguments(String),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// Stable code shown at the command boundary.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Registry(err) => err.code(),
            Self::Store(err) => err.code(),
            Self::Remote(err) => err.code(),
            Self::Timeout { .. } => "TIMEOUT",
            Self::Watch(_) => "WATCH_ERROR",
            Self::InvalidArguments(_) => "INVALID_ARGS",
            Self::Task(_) => "INTERNAL_ERROR",
        }
    }
}
