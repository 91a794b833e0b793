//! Persisted session state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ghd_core::RemoteIssue;
use serde::{Deserialize, Serialize};

use crate::SessionKey;

/// Per-agent state within a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    /// Role the agent speaks in.
    #[serde(default)]
    pub role: Option<String>,
    /// Last consumed sequence number.
    #[serde(default)]
    pub cursor: u64,
}

/// Cached copy of the remote issue's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueSnapshot {
    pub title: String,
    pub url: String,
    pub body: String,
    pub author: Option<String>,
}

impl From<&RemoteIssue> for IssueSnapshot {
    fn from(issue: &RemoteIssue) -> Self {
        Self {
            title: issue.title.clone(),
            url: issue.url.clone(),
            body: issue.body.clone().unwrap_or_default(),
            author: Some(issue.author.clone()),
        }
    }
}

/// Persisted binding between the local store and one remote issue thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub owner: String,
    pub repo: String,
    pub issue: u64,
    #[serde(default)]
    pub issue_title: String,
    #[serde(default)]
    pub issue_url: String,
    #[serde(default)]
    pub issue_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_author: Option<String>,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentState>,
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A fresh session with no agents.
    #[must_use]
    pub fn new(key: &SessionKey, snapshot: Option<&IssueSnapshot>) -> Self {
        let now = Utc::now();
        let mut session = Self {
            owner: key.owner.clone(),
            repo: key.repo.clone(),
            issue: key.issue,
            issue_title: String::new(),
            issue_url: String::new(),
            issue_body: String::new(),
            issue_author: None,
            agents: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };
        if let Some(snapshot) = snapshot {
            session.apply_snapshot(snapshot);
        }
        session
    }

    /// Identity of this session.
    #[must_use]
    pub fn key(&self) -> SessionKey {
        SessionKey {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            issue: self.issue,
        }
    }

    /// Replace the cached remote metadata.
    pub fn apply_snapshot(&mut self, snapshot: &IssueSnapshot) {
        self.issue_title.clone_from(&snapshot.title);
        self.issue_url.clone_from(&snapshot.url);
        self.issue_body.clone_from(&snapshot.body);
        if snapshot.author.is_some() {
            self.issue_author.clone_from(&snapshot.author);
        }
    }

    /// State of one agent.
    #[must_use]
    pub fn agent(&self, name: &str) -> Option<&AgentState> {
        self.agents.get(name)
    }

    /// Cursor of one agent (0 when unknown).
    #[must_use]
    pub fn cursor(&self, name: &str) -> u64 {
        self.agents.get(name).map_or(0, |a| a.cursor)
    }

    /// Cursors of every agent except `name`.
    #[must_use]
    pub fn other_cursors(&self, name: &str) -> BTreeMap<String, u64> {
        self.agents
            .iter()
            .filter(|(agent, _)| agent.as_str() != name)
            .map(|(agent, state)| (agent.clone(), state.cursor))
            .collect()
    }
}
