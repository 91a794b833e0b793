//! In-process issue tracker.

use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
use ghd_core::{IssueTracker, RemoteComment, RemoteError, RemoteIssue};

type IssueId = (String, String, u64);

#[derive(Debug, Default)]
struct Thread {
    issue: Option<RemoteIssue>,
    comments: Vec<RemoteComment>,
}

/// Tracker that keeps issues and comments in memory.
///
/// Ids are allocated from one counter so comment ids are unique across
/// every thread, as they are on GitHub.
#[derive(Debug)]
pub struct MemoryTracker {
    login: String,
    threads: RwLock<HashMap<IssueId, Thread>>,
    next_id: AtomicU64,
    fail_writes: AtomicBool,
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new("ghd-bot")
    }
}

impl MemoryTracker {
    /// Create an empty tracker; comments it creates are authored by `login`.
    #[must_use]
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            threads: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1000),
            fail_writes: AtomicBool::new(false),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn url(owner: &str, repo: &str, number: u64) -> String {
        format!("https://github.com/{owner}/{repo}/issues/{number}")
    }

    /// Seed an issue and return it.
    pub fn insert_issue(&self, owner: &str, repo: &str, number: u64, title: &str) -> RemoteIssue {
        let issue = RemoteIssue {
            number,
            author: self.login.clone(),
            title: title.to_string(),
            body: None,
            created_at: Utc::now(),
            url: Self::url(owner, repo, number),
        };
        let mut threads = self.threads.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        threads
            .entry((owner.to_string(), repo.to_string(), number))
            .or_default()
            .issue = Some(issue.clone());
        issue
    }

    /// Add a comment written by someone other than this tracker's login.
    ///
    /// The issue does not need to exist.
    pub fn add_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        author: &str,
        body: &str,
    ) -> RemoteComment {
        let id = self.next_id();
        let comment = RemoteComment {
            id,
            author: author.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
            url: format!("{}#issuecomment-{id}", Self::url(owner, repo, number)),
        };
        let mut threads = self.threads.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        threads
            .entry((owner.to_string(), repo.to_string(), number))
            .or_default()
            .comments
            .push(comment.clone());
        comment
    }

    /// Every comment on a thread, oldest first.
    #[must_use]
    pub fn comments(&self, owner: &str, repo: &str, number: u64) -> Vec<RemoteComment> {
        let threads = self.threads.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        threads
            .get(&(owner.to_string(), repo.to_string(), number))
            .map(|t| t.comments.clone())
            .unwrap_or_default()
    }

    /// Make `create_comment` and `create_issue` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    fn check_writable(&self) -> Result<(), RemoteError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(RemoteError::CallFailed(
                "gh CLI error (exit 1): write rejected".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for MemoryTracker {
    async fn fetch_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<RemoteIssue, RemoteError> {
        let threads = self.threads.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        threads
            .get(&(owner.to_string(), repo.to_string(), number))
            .and_then(|t| t.issue.clone())
            .ok_or_else(|| RemoteError::IssueNotFound {
                owner: owner.to_string(),
                repo: repo.to_string(),
                number,
            })
    }

    async fn fetch_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<RemoteComment>, RemoteError> {
        Ok(self.comments(owner, repo, number))
    }

    async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<RemoteComment, RemoteError> {
        self.check_writable()?;
        Ok(self.add_comment(owner, repo, number, &self.login, body))
    }

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
    ) -> Result<RemoteIssue, RemoteError> {
        self.check_writable()?;
        let mut threads = self.threads.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let number = threads
            .keys()
            .filter(|(o, r, _)| o == owner && r == repo)
            .map(|(_, _, n)| *n)
            .max()
            .unwrap_or(0)
            + 1;
        let issue = RemoteIssue {
            number,
            author: self.login.clone(),
            title: title.to_string(),
            body: (!body.is_empty()).then(|| body.to_string()),
            created_at: Utc::now(),
            url: Self::url(owner, repo, number),
        };
        threads
            .entry((owner.to_string(), repo.to_string(), number))
            .or_default()
            .issue = Some(issue.clone());
        Ok(issue)
    }
}
