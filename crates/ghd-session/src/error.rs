//! Registry errors.

use std::path::PathBuf;

use ghd_core::{StoreError, fs::LockError};
use thiserror::Error;

use crate::SessionKey;

/// Session registry error.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No session found for {0}. Run `ghd start` first.")]
    SessionNotFound(String),
    #[error("Issue #{issue} matches several sessions: {}", join_keys(.candidates))]
    AmbiguousSession {
        issue: u64,
        candidates: Vec<SessionKey>,
    },
    #[error("Session {0} already exists")]
    SessionAlreadyExists(SessionKey),
    #[error("Invalid session identifier {0:?}: expected owner/repo#N, an issue URL, or an issue number")]
    InvalidIdentifier(String),
    #[error("Invalid agent name {0:?}: use letters, digits, '-', '_' or '.'")]
    InvalidAgent(String),
    #[error("Corrupt session record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl RegistryError {
    /// Stable code shown at the command boundary.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "NO_SESSION",
            Self::AmbiguousSession { .. } => "AMBIGUOUS_SESSION",
            Self::SessionAlreadyExists(_) => "SESSION_EXISTS",
            Self::InvalidIdentifier(_) | Self::InvalidAgent(_) => "INVALID_ARGS",
            Self::Corrupt { .. } => "STORAGE_ERROR",
            Self::Store(err) => err.code(),
            Self::Lock(LockError::Timeout { .. }) => "LOCK_TIMEOUT",
            Self::Lock(LockError::Io { .. }) => "STORAGE_ERROR",
        }
    }
}

fn join_keys(keys: &[SessionKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
