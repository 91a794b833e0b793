//! Index of every session in the store, built with one directory walk.

use std::{
    collections::BTreeMap,
    fs, io,
    path::Path,
};

use ghd_core::StoreError;

use super::SESSION_FILE;
use crate::{RegistryError, SessionKey};

/// All sessions under a store root, grouped by issue number.
#[derive(Debug, Clone, Default)]
pub struct SessionIndex {
    by_issue: BTreeMap<u64, Vec<SessionKey>>,
}

impl SessionIndex {
    /// Walk `<root>/<owner>/<repo>/<issue>/session.json`.
    ///
    /// # Errors
    /// Returns error if a directory cannot be listed.
    pub fn build(root: &Path) -> Result<Self, RegistryError> {
        let mut index = Self::default();
        for (owner, owner_dir) in subdirs(root)? {
            for (repo, repo_dir) in subdirs(&owner_dir)? {
                for (issue, issue_dir) in subdirs(&repo_dir)? {
                    let Ok(issue) = issue.parse::<u64>() else {
                        continue;
                    };
                    if !issue_dir.join(SESSION_FILE).is_file() {
                        continue;
                    }
                    match SessionKey::new(&owner, &repo, issue) {
                        Ok(key) => index.insert(key),
                        Err(_) => {
                            tracing::debug!(path = %issue_dir.display(), "Skipping unrecognized session directory");
                        }
                    }
                }
            }
        }
        tracing::debug!(sessions = index.len(), root = %root.display(), "Built session index");
        Ok(index)
    }

    fn insert(&mut self, key: SessionKey) {
        let keys = self.by_issue.entry(key.issue).or_default();
        keys.push(key);
        keys.sort();
    }

    /// Sessions for a bare issue number.
    #[must_use]
    pub fn lookup(&self, issue: u64) -> &[SessionKey] {
        self.by_issue
            .get(&issue)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every session, ordered by issue then owner/repo.
    pub fn keys(&self) -> impl Iterator<Item = &SessionKey> {
        self.by_issue.values().flatten()
    }

    /// Number of sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_issue.values().map(Vec::len).sum()
    }

    /// Whether the store holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_issue.is_empty()
    }
}

fn subdirs(dir: &Path) -> Result<Vec<(String, std::path::PathBuf)>, RegistryError> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(StoreError::io("listing sessions", dir, source).into()),
    };

    let mut dirs = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| StoreError::io("listing sessions", dir, source))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        dirs.push((name, entry.path()));
    }
    Ok(dirs)
}
