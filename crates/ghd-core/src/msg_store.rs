//! Append-only, file-per-message log for one session.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;

use crate::{
    fs::{FileLock, LockError, write_atomic},
    message::{self, FormatError, LocalMessage, MessageDraft, is_valid_agent_name},
};

const LOCK_FILE: &str = ".lock";

/// Message store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed message file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
    #[error("No message with seq {seq} in {dir}")]
    RecordNotFound { seq: u64, dir: PathBuf },
    #[error("Message {seq} is already linked to remote comment {existing}, not {requested}")]
    RemoteIdConflict {
        seq: u64,
        existing: u64,
        requested: u64,
    },
    #[error("Invalid agent name: {0:?}")]
    InvalidAgent(String),
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl StoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Stable code shown at the command boundary.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } | Self::Malformed { .. } => "STORAGE_ERROR",
            Self::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            Self::RemoteIdConflict { .. } => "REMOTE_ID_CONFLICT",
            Self::InvalidAgent(_) => "INVALID_ARGS",
            Self::Lock(LockError::Timeout { .. }) => "LOCK_TIMEOUT",
            Self::Lock(LockError::Io { .. }) => "STORAGE_ERROR",
        }
    }
}

/// Message log backed by one directory.
///
/// Sequence numbers are allocated under an exclusive file lock and each
/// record is renamed into place, so a reader that sees seq `N` also sees
/// every seq below it.
#[derive(Debug, Clone)]
pub struct MessageStore {
    dir: PathBuf,
    lock_timeout: Duration,
}

impl MessageStore {
    /// Open the store in `dir`, creating the directory if needed.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>, lock_timeout: Duration) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|source| StoreError::io("creating message directory", &dir, source))?;
        Ok(Self { dir, lock_timeout })
    }

    /// Directory holding the message files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Take the store's exclusive lock.
    ///
    /// # Errors
    /// Returns error if the lock is not acquired within the lock timeout.
    pub fn lock(&self) -> Result<StoreGuard<'_>, StoreError> {
        let lock = FileLock::acquire(&self.dir.join(LOCK_FILE), self.lock_timeout)?;
        Ok(StoreGuard { store: self, _lock: lock })
    }

    /// Append a message and return it with its assigned seq.
    ///
    /// # Errors
    /// Returns error if the lock cannot be taken or the record cannot be written.
    pub fn append(&self, draft: MessageDraft) -> Result<LocalMessage, StoreError> {
        self.lock()?.append(draft)
    }

    /// Attach a remote comment id to message `seq`.
    ///
    /// Returns `false` when the same id was already attached.
    ///
    /// # Errors
    /// Returns `RecordNotFound` if no such message exists and
    /// `RemoteIdConflict` if a different id is already attached.
    pub fn patch_remote_id(&self, seq: u64, remote_id: u64) -> Result<bool, StoreError> {
        self.lock()?.patch_remote_id(seq, remote_id)
    }

    /// Every message, ascending by seq.
    ///
    /// # Errors
    /// Returns error if the directory or a message file cannot be read.
    pub fn read_all(&self) -> Result<Vec<LocalMessage>, StoreError> {
        self.entries()?
            .into_iter()
            .map(|(seq, path)| self.read_file(seq, &path))
            .collect()
    }

    /// Messages with `seq > cursor`, ascending.
    ///
    /// # Errors
    /// Returns error if the directory or a message file cannot be read.
    pub fn read_after(&self, cursor: u64) -> Result<Vec<LocalMessage>, StoreError> {
        self.entries()?
            .into_iter()
            .filter(|(seq, _)| *seq > cursor)
            .map(|(seq, path)| self.read_file(seq, &path))
            .collect()
    }

    /// Look up one message.
    ///
    /// # Errors
    /// Returns error if the message file cannot be read.
    pub fn get(&self, seq: u64) -> Result<Option<LocalMessage>, StoreError> {
        self.entries()?
            .into_iter()
            .find(|(s, _)| *s == seq)
            .map(|(seq, path)| self.read_file(seq, &path))
            .transpose()
    }

    /// Highest assigned seq, or 0 for an empty store.
    ///
    /// # Errors
    /// Returns error if the directory cannot be listed.
    pub fn last_seq(&self) -> Result<u64, StoreError> {
        Ok(self.entries()?.last().map_or(0, |(seq, _)| *seq))
    }

    /// Remote comment ids already attached to a message.
    ///
    /// # Errors
    /// Returns error if the log cannot be read.
    pub fn remote_ids(&self) -> Result<HashSet<u64>, StoreError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter_map(|m| m.remote_id)
            .collect())
    }

    fn entries(&self) -> Result<Vec<(u64, PathBuf)>, StoreError> {
        let read_dir = fs::read_dir(&self.dir)
            .map_err(|source| StoreError::io("listing messages", &self.dir, source))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry =
                entry.map_err(|source| StoreError::io("listing messages", &self.dir, source))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some((seq, _)) = message::parse_file_name(name) {
                entries.push((seq, entry.path()));
            }
        }

        entries.sort();
        entries.dedup_by(|next, kept| {
            let duplicate = next.0 == kept.0;
            if duplicate {
                tracing::warn!(
                    seq = next.0,
                    kept = %kept.1.display(),
                    ignored = %next.1.display(),
                    "Duplicate sequence number in message log"
                );
            }
            duplicate
        });
        Ok(entries)
    }

    fn read_file(&self, seq: u64, path: &Path) -> Result<LocalMessage, StoreError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| StoreError::io("reading message", path, source))?;
        message::parse(seq, &raw).map_err(|source| StoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Exclusive hold on a [`MessageStore`]; released on drop.
///
/// Lets a caller check the log and append in one critical section.
pub struct StoreGuard<'a> {
    store: &'a MessageStore,
    _lock: FileLock,
}

impl StoreGuard<'_> {
    /// The locked store.
    #[must_use]
    pub const fn store(&self) -> &MessageStore {
        self.store
    }

    /// Append while holding the lock.
    ///
    /// # Errors
    /// Returns error if the agent name is invalid or the record cannot be written.
    pub fn append(&self, draft: MessageDraft) -> Result<LocalMessage, StoreError> {
        if !is_valid_agent_name(&draft.agent) {
            return Err(StoreError::InvalidAgent(draft.agent));
        }

        let seq = self.store.last_seq()? + 1;
        let msg = draft.into_message(seq);
        let path = self.store.dir.join(message::file_name(seq, &msg.agent));
        write_atomic(&path, message::render(&msg).as_bytes())
            .map_err(|source| StoreError::io("writing message", &path, source))?;

        tracing::debug!(seq, agent = %msg.agent, remote_id = ?msg.remote_id, "Appended message");
        Ok(msg)
    }

    /// Attach a remote comment id while holding the lock.
    ///
    /// # Errors
    /// See [`MessageStore::patch_remote_id`].
    pub fn patch_remote_id(&self, seq: u64, remote_id: u64) -> Result<bool, StoreError> {
        let path = self
            .store
            .entries()?
            .into_iter()
            .find_map(|(s, path)| (s == seq).then_some(path))
            .ok_or_else(|| StoreError::RecordNotFound {
                seq,
                dir: self.store.dir.clone(),
            })?;

        let mut msg = self.store.read_file(seq, &path)?;
        match msg.remote_id {
            Some(existing) if existing == remote_id => return Ok(false),
            Some(existing) => {
                return Err(StoreError::RemoteIdConflict {
                    seq,
                    existing,
                    requested: remote_id,
                });
            }
            None => msg.remote_id = Some(remote_id),
        }

        write_atomic(&path, message::render(&msg).as_bytes())
            .map_err(|source| StoreError::io("patching message", &path, source))?;
        tracing::debug!(seq, remote_id, "Linked message to remote comment");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use chrono::{TimeZone, Utc};

    use super::*;

    fn store() -> (tempfile::TempDir, MessageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::open(dir.path().join("messages"), Duration::from_secs(5)).unwrap();
        (dir, store)
    }

    #[test]
    fn test_append_assigns_consecutive_seqs() {
        let (_dir, store) = store();
        let seqs: Vec<u64> = (0..5)
            .map(|i| store.append(MessageDraft::new("alice", format!("m{i}"))).unwrap().seq)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        assert_eq!(store.last_seq().unwrap(), 5);
    }

    #[test]
    fn test_concurrent_appenders_never_collide() {
        let (_dir, store) = store();
        let store = Arc::new(store);

        let handles: Vec<_> = ["alice", "bob", "carol", "dave"]
            .into_iter()
            .map(|agent| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..10)
                        .map(|i| store.append(MessageDraft::new(agent, format!("{i}"))).unwrap().seq)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seqs: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=40).collect::<Vec<_>>());
        assert_eq!(store.read_all().unwrap().len(), 40);
    }

    #[test]
    fn test_read_after_matches_filtered_read_all() {
        let (_dir, store) = store();
        for agent in ["alice", "bob", "alice", "carol"] {
            store.append(MessageDraft::new(agent, "x")).unwrap();
        }

        let all = store.read_all().unwrap();
        for cursor in 0..=6 {
            let expected: Vec<_> = all.iter().filter(|m| m.seq > cursor).cloned().collect();
            assert_eq!(store.read_after(cursor).unwrap(), expected, "cursor {cursor}");
        }
    }

    #[test]
    fn test_read_all_is_sorted_numerically_and_skips_foreign_files() {
        let (_dir, store) = store();
        for _ in 0..3 {
            store.append(MessageDraft::new("alice", "x")).unwrap();
        }
        fs::write(store.dir().join("notes.txt"), "ignore me").unwrap();
        fs::write(store.dir().join(".tmp-deadbeef"), "partial").unwrap();

        let seqs: Vec<u64> = store.read_all().unwrap().iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn test_append_keeps_draft_metadata() {
        let (_dir, store) = store();
        let time = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let msg = store
            .append(
                MessageDraft::new("bob", "Counter B")
                    .with_role(Some("Reviewer"))
                    .at(time)
                    .with_remote_id(99),
            )
            .unwrap();

        let stored = store.get(msg.seq).unwrap().unwrap();
        assert_eq!(stored, msg);
        assert_eq!(stored.role.as_deref(), Some("Reviewer"));
        assert_eq!(stored.time, time);
        assert_eq!(stored.remote_id, Some(99));
        assert!(store.dir().join("0001-bob.md").is_file());
    }

    #[test]
    fn test_append_rejects_unsafe_agent_names() {
        let (_dir, store) = store();
        let err = store.append(MessageDraft::new("../evil", "x")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidAgent(_)));
        assert_eq!(store.last_seq().unwrap(), 0);
    }

    #[test]
    fn test_patch_remote_id_is_idempotent() {
        let (_dir, store) = store();
        let msg = store.append(MessageDraft::new("alice", "hi")).unwrap();

        assert!(store.patch_remote_id(msg.seq, 7).unwrap());
        assert!(!store.patch_remote_id(msg.seq, 7).unwrap());
        assert_eq!(store.get(msg.seq).unwrap().unwrap().remote_id, Some(7));
        assert_eq!(store.get(msg.seq).unwrap().unwrap().body, "hi");
        assert_eq!(store.remote_ids().unwrap(), HashSet::from([7]));
    }

    #[test]
    fn test_patch_remote_id_never_relinks() {
        let (_dir, store) = store();
        let msg = store.append(MessageDraft::new("alice", "hi")).unwrap();
        store.patch_remote_id(msg.seq, 7).unwrap();

        let err = store.patch_remote_id(msg.seq, 8).unwrap_err();
        assert!(matches!(
            err,
            StoreError::RemoteIdConflict {
                existing: 7,
                requested: 8,
                ..
            }
        ));
        assert_eq!(err.code(), "REMOTE_ID_CONFLICT");
    }

    #[test]
    fn test_patch_remote_id_missing_record() {
        let (_dir, store) = store();
        let err = store.patch_remote_id(3, 1).unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { seq: 3, .. }));
        assert_eq!(err.code(), "RECORD_NOT_FOUND");
    }

    #[test]
    fn test_guard_holds_lock_across_check_and_append() {
        let (_dir, store) = store();
        let guard = store.lock().unwrap();

        let contender = MessageStore::open(store.dir(), Duration::from_millis(50)).unwrap();
        let err = contender.append(MessageDraft::new("bob", "x")).unwrap_err();
        assert_eq!(err.code(), "LOCK_TIMEOUT");

        guard.append(MessageDraft::new("alice", "first")).unwrap();
        drop(guard);
        assert_eq!(contender.append(MessageDraft::new("bob", "x")).unwrap().seq, 2);
    }
}
