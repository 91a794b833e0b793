//! Agent marker carried at the top of every pushed comment.
//!
//! A pushed comment looks like:
//!
//! ```text
//! <!-- ghd:v1 agent:claude role:Senior%20Reviewer -->
//! > **claude** · Senior Reviewer
//!
//! body text
//! ```
//!
//! The HTML comment is invisible on GitHub; the quoted header is for humans.

use ghd_core::{is_valid_agent_name, normalize_role};

const OPEN: &str = "<!--";
const CLOSE: &str = "-->";
const V1_TAG: &str = "ghd:v1";
const LEGACY_TAG: &str = "ghd:agent:";

/// Result of decoding a remote comment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Agent named by the marker; `None` for comments written by humans or
    /// other tools.
    pub agent: Option<String>,
    pub role: Option<String>,
    /// Body with marker and header removed.
    pub body: String,
}

impl Decoded {
    fn foreign(raw: &str) -> Self {
        Self {
            agent: None,
            role: None,
            body: raw.to_string(),
        }
    }
}

/// Build the wire body for a message.
#[must_use]
pub fn encode(agent: &str, role: Option<&str>, body: &str) -> String {
    let role = role.and_then(normalize_role);
    let mut out = format!("{OPEN} {V1_TAG} agent:{}", urlencoding::encode(agent));
    if let Some(role) = &role {
        out.push_str(" role:");
        out.push_str(&urlencoding::encode(role));
    }
    out.push_str(" -->\n");
    out.push_str(&header(agent, role.as_deref()));
    out.push_str(body);
    out
}

fn header(agent: &str, role: Option<&str>) -> String {
    match role {
        Some(role) => format!("> **{agent}** · {role}\n\n"),
        None => format!("> **{agent}**\n\n"),
    }
}

/// Split a remote comment body into marker metadata and text.
///
/// The marker only counts at the very start of the body.
#[must_use]
pub fn decode(raw: &str) -> Decoded {
    let normalized = raw.replace("\r\n", "\n");
    let Some(after_open) = normalized.strip_prefix(OPEN) else {
        return Decoded::foreign(&normalized);
    };
    let Some(close) = after_open.find(CLOSE) else {
        return Decoded::foreign(&normalized);
    };
    let inner = after_open[..close].trim();
    let rest = &after_open[close + CLOSE.len()..];

    let parsed = inner
        .strip_prefix(V1_TAG)
        .filter(|tail| tail.is_empty() || tail.starts_with(char::is_whitespace))
        .map(parse_v1)
        .or_else(|| inner.strip_prefix(LEGACY_TAG).map(parse_legacy));
    let Some((agent, role)) = parsed else {
        return Decoded::foreign(&normalized);
    };
    let Some(agent) = agent.filter(|name| is_valid_agent_name(name)) else {
        tracing::debug!("Ignoring marker with unusable agent name");
        return Decoded::foreign(&normalized);
    };

    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    Decoded {
        agent: Some(agent),
        role: role.as_deref().and_then(normalize_role),
        body: strip_header(rest).to_string(),
    }
}

fn parse_v1(fields: &str) -> (Option<String>, Option<String>) {
    let mut agent = None;
    let mut role = None;
    for token in fields.split_whitespace() {
        if let Some(value) = token.strip_prefix("agent:") {
            agent = urlencoding::decode(value).ok().map(|v| v.into_owned());
        } else if let Some(value) = token.strip_prefix("role:") {
            role = urlencoding::decode(value).ok().map(|v| v.into_owned());
        }
    }
    (agent, role)
}

/// `ghd:agent:NAME [role:ROLE]`, unescaped.
fn parse_legacy(fields: &str) -> (Option<String>, Option<String>) {
    let (name, tail) = fields
        .split_once(char::is_whitespace)
        .unwrap_or((fields, ""));
    let role = tail.trim().strip_prefix("role:").map(|r| r.trim().to_string());
    ((!name.is_empty()).then(|| name.to_string()), role)
}

/// Drop a leading `> **name** · role` line and the blank line after it.
fn strip_header(text: &str) -> &str {
    let Some((first, rest)) = text.split_once('\n') else {
        return text;
    };
    let is_header = first
        .strip_prefix("> **")
        .and_then(|t| t.find("**").map(|end| &t[end + 2..]))
        .is_some_and(|tail| tail.is_empty() || tail.starts_with(" · "));
    if !is_header {
        return text;
    }
    rest.strip_prefix('\n').unwrap_or(rest)
}
