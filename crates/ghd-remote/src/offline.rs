//! Tracker used when remote access is switched off.

use async_trait::async_trait;
use ghd_core::{IssueTracker, RemoteComment, RemoteError, RemoteIssue};

/// Fails every call with [`RemoteError::Offline`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTracker;

#[async_trait]
impl IssueTracker for OfflineTracker {
    async fn fetch_issue(&self, _: &str, _: &str, _: u64) -> Result<RemoteIssue, RemoteError> {
        Err(RemoteError::Offline)
    }

    async fn fetch_comments(
        &self,
        _: &str,
        _: &str,
        _: u64,
    ) -> Result<Vec<RemoteComment>, RemoteError> {
        Err(RemoteError::Offline)
    }

    async fn create_comment(
        &self,
        _: &str,
        _: &str,
        _: u64,
        _: &str,
    ) -> Result<RemoteComment, RemoteError> {
        Err(RemoteError::Offline)
    }

    async fn create_issue(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: &str,
    ) -> Result<RemoteIssue, RemoteError> {
        Err(RemoteError::Offline)
    }
}
