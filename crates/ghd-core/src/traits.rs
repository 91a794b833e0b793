//! Remote issue-tracker seam.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Snapshot of a remote issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIssue {
    pub number: u64,
    /// Login of the issue author.
    pub author: String,
    pub title: String,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub url: String,
}

/// Read-only view of one comment on the remote thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteComment {
    pub id: u64,
    /// Login of the comment author.
    pub author: String,
    /// Raw body, possibly starting with an agent marker.
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub url: String,
}

/// Remote call error.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote call failed: {0}")]
    CallFailed(String),
    #[error("Issue {owner}/{repo}#{number} not found or not accessible")]
    IssueNotFound {
        owner: String,
        repo: String,
        number: u64,
    },
    #[error("Malformed remote response: {0}")]
    Malformed(String),
    #[error("Remote tracker is offline")]
    Offline,
}

impl RemoteError {
    /// Stable code shown at the command boundary.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CallFailed(_) | Self::Malformed(_) => "GH_CLI_ERROR",
            Self::IssueNotFound { .. } => "ISSUE_NOT_FOUND",
            Self::Offline => "OFFLINE",
        }
    }
}

/// Operations ghd consumes from the remote issue tracker.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Fetch issue metadata.
    async fn fetch_issue(&self, owner: &str, repo: &str, number: u64)
    -> Result<RemoteIssue, RemoteError>;

    /// Fetch every comment on an issue, oldest first.
    async fn fetch_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<RemoteComment>, RemoteError>;

    /// Post a comment.
    async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<RemoteComment, RemoteError>;

    /// Open a new issue.
    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
    ) -> Result<RemoteIssue, RemoteError>;
}

#[async_trait]
impl<T: IssueTracker + ?Sized> IssueTracker for Arc<T> {
    async fn fetch_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<RemoteIssue, RemoteError> {
        (**self).fetch_issue(owner, repo, number).await
    }

    async fn fetch_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<RemoteComment>, RemoteError> {
        (**self).fetch_comments(owner, repo, number).await
    }

    async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<RemoteComment, RemoteError> {
        (**self).create_comment(owner, repo, number, body).await
    }

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
    ) -> Result<RemoteIssue, RemoteError> {
        (**self).create_issue(owner, repo, title, body).await
    }
}
