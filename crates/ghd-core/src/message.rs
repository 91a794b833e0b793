//! Local message records and their on-disk format.
//!
//! Each message lives in its own file named `<seq>-<agent>.md`:
//!
//! ```text
//! ---
//! agent: alice
//! role: Reviewer
//! time: 2026-10-18T12:00:00Z
//! comment-id: 123456
//! ---
//!
//! body text
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const FENCE: &str = "---";
const MAX_AGENT_NAME: usize = 64;

/// One durable contribution to a discussion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMessage {
    /// Position in the session log, starting at 1.
    pub seq: u64,
    /// Authoring agent, or the remote author handle for non-agent comments.
    pub agent: String,
    /// Role the agent spoke in, if any.
    pub role: Option<String>,
    /// When the message was written (or created remotely, for imports).
    pub time: DateTime<Utc>,
    /// Id of the remote comment carrying this message, once known.
    pub remote_id: Option<u64>,
    /// Message text.
    pub body: String,
}

impl LocalMessage {
    /// Whether this message was written by `agent`.
    #[must_use]
    pub fn is_from(&self, agent: &str) -> bool {
        self.agent == agent
    }
}

/// A message that has not been assigned a sequence number yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub agent: String,
    pub role: Option<String>,
    pub body: String,
    pub time: Option<DateTime<Utc>>,
    pub remote_id: Option<u64>,
}

impl MessageDraft {
    /// Create a draft authored by `agent`.
    #[must_use]
    pub fn new(agent: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            role: None,
            body: body.into(),
            time: None,
            remote_id: None,
        }
    }

    /// Set the speaking role. Blank roles are dropped.
    #[must_use]
    pub fn with_role(mut self, role: Option<&str>) -> Self {
        self.role = role.and_then(normalize_role);
        self
    }

    /// Pin the timestamp instead of using the append time.
    #[must_use]
    pub const fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Attach the remote comment id up front (used for imports).
    #[must_use]
    pub const fn with_remote_id(mut self, id: u64) -> Self {
        self.remote_id = Some(id);
        self
    }

    pub(crate) fn into_message(self, seq: u64) -> LocalMessage {
        LocalMessage {
            seq,
            agent: self.agent,
            role: self.role,
            time: self.time.unwrap_or_else(Utc::now),
            remote_id: self.remote_id,
            body: self.body,
        }
    }
}

/// Check that `name` can be used as an agent name (and inside a file name).
#[must_use]
pub fn is_valid_agent_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_AGENT_NAME
        && first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Trim a role and fold line breaks into spaces; blank roles become `None`.
#[must_use]
pub fn normalize_role(role: &str) -> Option<String> {
    let folded: String = role
        .chars()
        .map(|c| if matches!(c, '\n' | '\r') { ' ' } else { c })
        .collect();
    let trimmed = folded.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Message file format error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("missing front matter")]
    MissingFrontMatter,
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("invalid value for '{field}': {value}")]
    InvalidField { field: &'static str, value: String },
}

pub(crate) fn file_name(seq: u64, agent: &str) -> String {
    format!("{seq:04}-{agent}.md")
}

/// Split `0007-alice.md` into `(7, "alice")`.
pub(crate) fn parse_file_name(name: &str) -> Option<(u64, &str)> {
    let stem = name.strip_suffix(".md")?;
    let (digits, agent) = stem.split_once('-')?;
    if digits.len() < 4 || !digits.bytes().all(|b| b.is_ascii_digit()) || agent.is_empty() {
        return None;
    }
    let seq = digits.parse().ok()?;
    (seq > 0).then_some((seq, agent))
}

pub(crate) fn render(msg: &LocalMessage) -> String {
    let mut out = String::with_capacity(msg.body.len() + 128);
    out.push_str(FENCE);
    out.push('\n');
    out.push_str(&format!("agent: {}\n", msg.agent));
    if let Some(role) = &msg.role {
        out.push_str(&format!("role: {role}\n"));
    }
    out.push_str(&format!(
        "time: {}\n",
        msg.time.to_rfc3339_opts(SecondsFormat::Millis, true)
    ));
    if let Some(id) = msg.remote_id {
        out.push_str(&format!("comment-id: {id}\n"));
    }
    out.push_str(FENCE);
    out.push_str("\n\n");
    out.push_str(&msg.body);
    out.push('\n');
    out
}

pub(crate) fn parse(seq: u64, raw: &str) -> Result<LocalMessage, FormatError> {
    let rest = raw
        .strip_prefix("---\n")
        .ok_or(FormatError::MissingFrontMatter)?;
    let (header, body) = match rest.find("\n---\n") {
        Some(end) => (&rest[..end], &rest[end + 5..]),
        None => return Err(FormatError::MissingFrontMatter),
    };

    let mut agent = None;
    let mut role = None;
    let mut time = None;
    let mut remote_id = None;
    for line in header.lines() {
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        match key {
            "agent" => agent = Some(value.to_string()),
            "role" => role = normalize_role(value),
            "time" => {
                let parsed = DateTime::parse_from_rfc3339(value).map_err(|_| {
                    FormatError::InvalidField {
                        field: "time",
                        value: value.to_string(),
                    }
                })?;
                time = Some(parsed.with_timezone(&Utc));
            }
            "comment-id" => {
                let id = value.parse().map_err(|_| FormatError::InvalidField {
                    field: "comment-id",
                    value: value.to_string(),
                })?;
                remote_id = Some(id);
            }
            _ => {}
        }
    }

    let body = body.strip_prefix('\n').unwrap_or(body);
    let body = body.strip_suffix('\n').unwrap_or(body);

    Ok(LocalMessage {
        seq,
        agent: agent.ok_or(FormatError::MissingField("agent"))?,
        role,
        time: time.ok_or(FormatError::MissingField("time"))?,
        remote_id,
        body: body.to_string(),
    })
}
