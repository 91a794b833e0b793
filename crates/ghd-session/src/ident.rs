//! Session identity and identifier parsing.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::RegistryError;

/// Identity of a session: one remote issue thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub owner: String,
    pub repo: String,
    pub issue: u64,
}

impl SessionKey {
    /// Build a key, checking that owner and repo are safe path segments.
    ///
    /// # Errors
    /// Returns `InvalidIdentifier` for empty or unsafe segments or issue 0.
    pub fn new(owner: &str, repo: &str, issue: u64) -> Result<Self, RegistryError> {
        if !is_valid_segment(owner) || !is_valid_segment(repo) || issue == 0 {
            return Err(RegistryError::InvalidIdentifier(format!(
                "{owner}/{repo}#{issue}"
            )));
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            issue,
        })
    }

    /// Build a key from `owner/repo` and an issue number.
    ///
    /// # Errors
    /// Returns `InvalidIdentifier` if `repo` is not `owner/repo`.
    pub fn from_repo(repo: &str, issue: u64) -> Result<Self, RegistryError> {
        let (owner, name) = split_repo(repo)?;
        Self::new(owner, name, issue)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.issue)
    }
}

/// Split `owner/repo` into its two segments.
///
/// # Errors
/// Returns `InvalidIdentifier` unless the input is exactly two valid segments.
pub fn split_repo(repo: &str) -> Result<(&str, &str), RegistryError> {
    let trimmed = repo.trim();
    match trimmed.split_once('/') {
        Some((owner, name)) if is_valid_segment(owner) && is_valid_segment(name) => {
            Ok((owner, name))
        }
        _ => Err(RegistryError::InvalidIdentifier(repo.to_string())),
    }
}

/// A user-supplied reference to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIdent {
    /// Fully qualified `owner/repo#N`.
    Full(SessionKey),
    /// Bare issue number, resolved by searching every session.
    Issue(u64),
}

impl FromStr for SessionIdent {
    type Err = RegistryError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || RegistryError::InvalidIdentifier(raw.to_string());
        let s = raw.trim().trim_end_matches('/');

        let bare = s.strip_prefix('#').unwrap_or(s);
        if !bare.is_empty() && bare.bytes().all(|b| b.is_ascii_digit()) {
            let issue: u64 = bare.parse().map_err(|_| invalid())?;
            if issue == 0 {
                return Err(invalid());
            }
            return Ok(Self::Issue(issue));
        }

        let path = ["https://", "http://"]
            .iter()
            .find_map(|scheme| s.strip_prefix(scheme))
            .unwrap_or(s);
        let path = path.strip_prefix("www.").unwrap_or(path);
        let path = path.strip_prefix("github.com/").unwrap_or(path);

        // owner/repo/issues/N
        let parts: Vec<&str> = path.split('/').collect();
        if let [owner, repo, "issues", number] = parts.as_slice() {
            let issue = number.parse().map_err(|_| invalid())?;
            return SessionKey::new(owner, repo, issue)
                .map(Self::Full)
                .map_err(|_| invalid());
        }

        // owner/repo#N or owner/repo/N
        let (repo_part, number) = path
            .rsplit_once('#')
            .or_else(|| path.rsplit_once('/'))
            .ok_or_else(invalid)?;
        let issue = number.parse().map_err(|_| invalid())?;
        SessionKey::from_repo(repo_part, issue)
            .map(Self::Full)
            .map_err(|_| invalid())
    }
}

impl fmt::Display for SessionIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(key) => key.fmt(f),
            Self::Issue(issue) => write!(f, "#{issue}"),
        }
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= 100
        && !segment.starts_with('.')
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
