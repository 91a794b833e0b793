//! Plain-text rendering for command output and errors.

use chrono::{DateTime, SecondsFormat, Utc};
use ghd_core::{LocalMessage, RemoteError, StoreError, fs::LockError};
use ghd_session::{RegistryError, Session};
use ghd_sync::SyncError;

fn timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn label(agent: &str, role: Option<&str>) -> String {
    match role {
        Some(role) => format!("@{agent} · {role}"),
        None => format!("@{agent}"),
    }
}

/// One message with its header line.
#[must_use]
pub fn message(msg: &LocalMessage, is_new: bool) -> String {
    let tag = if is_new { " [NEW]" } else { "" };
    format!(
        "#{} {}{tag} {}\n{}\n",
        msg.seq,
        label(&msg.agent, msg.role.as_deref()),
        timestamp(&msg.time),
        msg.body
    )
}

/// Messages separated by rules, or a placeholder when there are none.
#[must_use]
pub fn messages(msgs: &[LocalMessage], is_new: impl Fn(&LocalMessage) -> bool) -> String {
    if msgs.is_empty() {
        return "No messages.".to_string();
    }
    msgs.iter()
        .map(|m| message(m, is_new(m)))
        .collect::<Vec<_>>()
        .join("\n---\n\n")
}

/// The issue that anchors a session.
#[must_use]
pub fn issue(session: &Session) -> String {
    let mut out = format!("{} [issue]", session.key());
    if let Some(author) = &session.issue_author {
        out.push_str(&format!(" by @{author}"));
    }
    out.push('\n');
    if !session.issue_url.is_empty() {
        out.push_str(&session.issue_url);
        out.push('\n');
    }
    if !session.issue_title.is_empty() {
        out.push_str(&session.issue_title);
        out.push('\n');
    }
    let body = session.issue_body.trim();
    if !body.is_empty() {
        out.push_str(body);
        out.push('\n');
    }
    out
}

/// Full description of one session.
#[must_use]
pub fn session(session: &Session) -> String {
    let mut lines = vec![
        "Session".to_string(),
        format!("  Issue:   {}", session.key()),
        format!("  Title:   {}", session.issue_title),
        format!("  URL:     {}", session.issue_url),
        format!("  Created: {}", timestamp(&session.created_at)),
        format!("  Updated: {}", timestamp(&session.updated_at)),
        String::new(),
        "Agents".to_string(),
    ];
    if session.agents.is_empty() {
        lines.push("  (none)".to_string());
    }
    for (name, state) in &session.agents {
        let role = state
            .role
            .as_deref()
            .map(|r| format!(" · {r}"))
            .unwrap_or_default();
        lines.push(format!("  {name}{role} cursor:{}", state.cursor));
    }
    lines.join("\n")
}

/// One line per session, for `status` without a target.
#[must_use]
pub fn session_list(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "No sessions.".to_string();
    }
    sessions
        .iter()
        .map(|s| {
            let agents = s.agents.keys().map(String::as_str).collect::<Vec<_>>().join(", ");
            format!("{}  {}  [{}]", s.key(), s.issue_title, agents)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Stable code for the first coded error in the chain.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<SyncError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<RegistryError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<StoreError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<RemoteError>() {
            return e.code();
        }
        if let Some(e) = cause.downcast_ref::<LockError>() {
            return match e {
                LockError::Timeout { .. } => "LOCK_TIMEOUT",
                LockError::Io { .. } => "STORAGE_ERROR",
            };
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return "IO_ERROR";
        }
    }
    "ERROR"
}

/// `[CODE] message` line printed on failure.
#[must_use]
pub fn error(err: &anyhow::Error) -> String {
    format!("[{}] {err:#}", error_code(err))
}
