//! GitHub issue tracker backed by the `gh` CLI.

use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ghd_core::{GhdConfig, IssueTracker, RemoteComment, RemoteError, RemoteIssue};
use serde::Deserialize;
use tokio::process::Command;

use crate::command::{ApiRequest, GhCommand};

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    user: GhUser,
    title: String,
    body: Option<String>,
    created_at: DateTime<Utc>,
    html_url: String,
}

impl From<GhIssue> for RemoteIssue {
    fn from(issue: GhIssue) -> Self {
        Self {
            number: issue.number,
            author: issue.user.login,
            title: issue.title,
            body: issue.body,
            created_at: issue.created_at,
            url: issue.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhComment {
    id: u64,
    user: GhUser,
    #[serde(default)]
    body: Option<String>,
    created_at: DateTime<Utc>,
    html_url: String,
}

impl From<GhComment> for RemoteComment {
    fn from(comment: GhComment) -> Self {
        Self {
            id: comment.id,
            author: comment.user.login,
            body: comment.body.unwrap_or_default(),
            created_at: comment.created_at,
            url: comment.html_url,
        }
    }
}

/// Issue tracker that shells out to `gh api`.
///
/// Authentication and host selection are left to `gh` itself.
#[derive(Debug, Clone)]
pub struct GhClient {
    command: GhCommand,
}

impl GhClient {
    /// Create a client running `base` (for example `gh`).
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            command: GhCommand::new(base),
        }
    }

    /// Create a client from configuration.
    #[must_use]
    pub fn from_config(config: &GhdConfig) -> Self {
        Self::new(config.gh_command.clone())
    }

    async fn run(&self, request: &ApiRequest) -> Result<String, RemoteError> {
        let (program, args) = self
            .command
            .invocation(request)
            .map_err(|e| RemoteError::CallFailed(e.to_string()))?
            .resolve()
            .await
            .map_err(|e| RemoteError::CallFailed(e.to_string()))?;

        tracing::debug!(program = %program.display(), endpoint = request.endpoint(), "Running gh api");
        let output = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RemoteError::CallFailed(format!("failed to run {}: {e}", program.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(RemoteError::CallFailed(format!(
                "gh CLI error (exit {code}): {}",
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| RemoteError::Malformed(format!("non-UTF-8 output: {e}")))
    }
}

/// Whether a failed call was GitHub answering 404 or 410, as opposed to `gh`
/// missing, auth trouble or a network fault.
fn is_missing_resource(reason: &str) -> bool {
    reason.contains("HTTP 404") || reason.contains("HTTP 410")
}

fn parse<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, RemoteError> {
    serde_json::from_str(raw).map_err(|e| RemoteError::Malformed(e.to_string()))
}

/// Parse `gh api --paginate` output, which concatenates one JSON array per page.
fn parse_pages<T: serde::de::DeserializeOwned>(raw: &str) -> Result<Vec<T>, RemoteError> {
    let mut items = Vec::new();
    for page in serde_json::Deserializer::from_str(raw).into_iter::<Vec<T>>() {
        items.extend(page.map_err(|e| RemoteError::Malformed(e.to_string()))?);
    }
    Ok(items)
}

#[async_trait]
impl IssueTracker for GhClient {
    async fn fetch_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<RemoteIssue, RemoteError> {
        let request = ApiRequest::get(format!("repos/{owner}/{repo}/issues/{number}"));
        let raw = self.run(&request).await.map_err(|err| match err {
            RemoteError::CallFailed(reason) if is_missing_resource(&reason) => {
                tracing::debug!(%reason, "Issue lookup failed");
                RemoteError::IssueNotFound {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    number,
                }
            }
            other => other,
        })?;
        parse::<GhIssue>(&raw).map(Into::into)
    }

    async fn fetch_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<RemoteComment>, RemoteError> {
        let request =
            ApiRequest::get(format!("repos/{owner}/{repo}/issues/{number}/comments?per_page=100"))
                .paginate();
        let raw = self.run(&request).await?;
        let comments = parse_pages::<GhComment>(&raw)?;
        Ok(comments.into_iter().map(Into::into).collect())
    }

    async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<RemoteComment, RemoteError> {
        let request = ApiRequest::post(format!("repos/{owner}/{repo}/issues/{number}/comments"))
            .field("body", body);
        let raw = self.run(&request).await?;
        parse::<GhComment>(&raw).map(Into::into)
    }

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
    ) -> Result<RemoteIssue, RemoteError> {
        let request = ApiRequest::post(format!("repos/{owner}/{repo}/issues"))
            .field("title", title)
            .field("body", body);
        let raw = self.run(&request).await.map_err(|err| match err {
            RemoteError::CallFailed(reason) => RemoteError::CallFailed(format!(
                "failed to create issue on {owner}/{repo}: {reason}"
            )),
            other => other,
        })?;
        parse::<GhIssue>(&raw).map(Into::into)
    }
}
