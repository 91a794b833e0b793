//! Session registry: create, locate and update sessions.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::Utc;
use ghd_core::{
    GhdConfig, MessageStore, StoreError, fs::FileLock, is_valid_agent_name, normalize_role,
};

use crate::{
    AgentState, IssueSnapshot, RegistryError, Session, SessionIdent, SessionKey,
    storage::{self, MESSAGES_DIR, SESSION_FILE, SESSION_LOCK, SessionIndex, file},
};

/// Registry of every session under one store root.
///
/// The global index used for bare issue numbers is built at most once per
/// registry value and dropped whenever this registry creates a session.
pub struct SessionRegistry {
    root: PathBuf,
    lock_timeout: Duration,
    index: Mutex<Option<Arc<SessionIndex>>>,
}

impl SessionRegistry {
    /// Create a registry rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            lock_timeout,
            index: Mutex::new(None),
        }
    }

    /// Create a registry from configuration.
    #[must_use]
    pub fn from_config(config: &GhdConfig) -> Self {
        Self::new(config.home.clone(), config.lock_timeout)
    }

    /// Store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create or load the session for `key`.
    ///
    /// An existing session keeps its agents and messages; only the cached
    /// remote metadata is refreshed (when `snapshot` is given).
    ///
    /// # Errors
    /// Returns error if the session cannot be read or written.
    pub fn start(
        &self,
        key: &SessionKey,
        snapshot: Option<&IssueSnapshot>,
    ) -> Result<(SessionHandle, bool), RegistryError> {
        let handle = self.handle(key);
        handle.ensure_dirs()?;

        let created = {
            let _lock = handle.lock()?;
            let path = handle.session_file();
            match file::load(&path)? {
                Some(mut session) => {
                    if let Some(snapshot) = snapshot {
                        session.apply_snapshot(snapshot);
                        session.updated_at = Utc::now();
                        file::save(&path, &session)?;
                    }
                    false
                }
                None => {
                    file::save(&path, &Session::new(key, snapshot))?;
                    true
                }
            }
        };

        if created {
            self.invalidate_index();
            tracing::info!(session = %key, "Created session");
        } else {
            tracing::debug!(session = %key, "Loaded existing session");
        }
        Ok((handle, created))
    }

    /// Create the session for `key`, failing if it already exists.
    ///
    /// # Errors
    /// Returns `SessionAlreadyExists` if the key is already registered.
    pub fn create(
        &self,
        key: &SessionKey,
        snapshot: Option<&IssueSnapshot>,
    ) -> Result<SessionHandle, RegistryError> {
        let handle = self.handle(key);
        handle.ensure_dirs()?;
        {
            let _lock = handle.lock()?;
            let path = handle.session_file();
            if file::load(&path)?.is_some() {
                return Err(RegistryError::SessionAlreadyExists(key.clone()));
            }
            file::save(&path, &Session::new(key, snapshot))?;
        }
        self.invalidate_index();
        tracing::info!(session = %key, "Created session");
        Ok(handle)
    }

    /// Resolve an identifier to exactly one session.
    ///
    /// # Errors
    /// Returns `SessionNotFound` if nothing matches and `AmbiguousSession`
    /// if a bare issue number matches several sessions.
    pub fn find(&self, ident: &SessionIdent) -> Result<SessionHandle, RegistryError> {
        match ident {
            SessionIdent::Full(key) => {
                let handle = self.handle(key);
                if handle.session_file().is_file() {
                    Ok(handle)
                } else {
                    Err(RegistryError::SessionNotFound(key.to_string()))
                }
            }
            SessionIdent::Issue(issue) => {
                let index = self.index()?;
                match index.lookup(*issue) {
                    [] => Err(RegistryError::SessionNotFound(ident.to_string())),
                    [key] => Ok(self.handle(key)),
                    candidates => Err(RegistryError::AmbiguousSession {
                        issue: *issue,
                        candidates: candidates.to_vec(),
                    }),
                }
            }
        }
    }

    /// Every session in the store.
    ///
    /// # Errors
    /// Returns error if the store cannot be listed or a record cannot be read.
    pub fn list(&self) -> Result<Vec<Session>, RegistryError> {
        let index = self.index()?;
        let mut sessions = Vec::with_capacity(index.len());
        for key in index.keys() {
            if let Some(session) = self.handle(key).load_opt()? {
                sessions.push(session);
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    fn handle(&self, key: &SessionKey) -> SessionHandle {
        SessionHandle {
            key: key.clone(),
            dir: storage::session_dir(&self.root, key),
            lock_timeout: self.lock_timeout,
        }
    }

    fn index(&self) -> Result<Arc<SessionIndex>, RegistryError> {
        let mut slot = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = slot.as_ref() {
            return Ok(Arc::clone(index));
        }
        let built = Arc::new(SessionIndex::build(&self.root)?);
        *slot = Some(Arc::clone(&built));
        Ok(built)
    }

    fn invalidate_index(&self) {
        *self.index.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Access to one session's state and message log.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    key: SessionKey,
    dir: PathBuf,
    lock_timeout: Duration,
}

impl SessionHandle {
    /// Identity of the session.
    #[must_use]
    pub const fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Directory holding the session.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the session record.
    #[must_use]
    pub fn session_file(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    /// Directory holding the message files.
    #[must_use]
    pub fn messages_dir(&self) -> PathBuf {
        self.dir.join(MESSAGES_DIR)
    }

    /// Open the session's message log.
    ///
    /// # Errors
    /// Returns error if the message directory cannot be created.
    pub fn messages(&self) -> Result<MessageStore, StoreError> {
        MessageStore::open(self.messages_dir(), self.lock_timeout)
    }

    /// Read the session record.
    ///
    /// # Errors
    /// Returns `SessionNotFound` if the record is gone.
    pub fn load(&self) -> Result<Session, RegistryError> {
        self.load_opt()?
            .ok_or_else(|| RegistryError::SessionNotFound(self.key.to_string()))
    }

    fn load_opt(&self) -> Result<Option<Session>, RegistryError> {
        file::load(&self.session_file())
    }

    /// Read-modify-write the session record under its lock.
    ///
    /// # Errors
    /// Returns error if the lock cannot be taken or the record cannot be
    /// read or written.
    pub fn update<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Result<R, RegistryError> {
        let _lock = self.lock()?;
        let path = self.session_file();
        let mut session = self.load()?;
        let out = f(&mut session);
        session.updated_at = Utc::now();
        file::save(&path, &session)?;
        Ok(out)
    }

    /// Add an agent with cursor 0, or update its role.
    ///
    /// A known agent's role only changes when a non-empty role is supplied.
    ///
    /// # Errors
    /// Returns `InvalidAgent` for unusable names, or a storage error.
    pub fn register_agent(
        &self,
        name: &str,
        role: Option<&str>,
    ) -> Result<AgentState, RegistryError> {
        if !is_valid_agent_name(name) {
            return Err(RegistryError::InvalidAgent(name.to_string()));
        }
        let role = role.and_then(normalize_role);
        self.update(|session| {
            let state = session.agents.entry(name.to_string()).or_default();
            if role.is_some() {
                state.role = role;
            }
            state.clone()
        })
    }

    /// Move an agent's cursor forward to `seq`; never moves it back.
    ///
    /// Returns the resulting cursor.
    ///
    /// # Errors
    /// Returns `InvalidAgent` for unusable names, or a storage error.
    pub fn advance_cursor(&self, name: &str, seq: u64) -> Result<u64, RegistryError> {
        if !is_valid_agent_name(name) {
            return Err(RegistryError::InvalidAgent(name.to_string()));
        }
        self.update(|session| {
            let state = session.agents.entry(name.to_string()).or_default();
            state.cursor = state.cursor.max(seq);
            state.cursor
        })
    }

    /// Remove an agent from the session. Messages stay in the log.
    ///
    /// Returns whether the agent was registered.
    ///
    /// # Errors
    /// Returns error if the record cannot be updated.
    pub fn remove_agent(&self, name: &str) -> Result<bool, RegistryError> {
        self.update(|session| session.agents.remove(name).is_some())
    }

    /// Replace the cached remote metadata.
    ///
    /// # Errors
    /// Returns error if the record cannot be updated.
    pub fn refresh_snapshot(&self, snapshot: &IssueSnapshot) -> Result<(), RegistryError> {
        self.update(|session| session.apply_snapshot(snapshot))
    }

    fn ensure_dirs(&self) -> Result<(), RegistryError> {
        let messages = self.messages_dir();
        fs::create_dir_all(&messages)
            .map_err(|source| StoreError::io("creating session directory", &messages, source))?;
        Ok(())
    }

    fn lock(&self) -> Result<FileLock, RegistryError> {
        Ok(FileLock::acquire(&self.dir.join(SESSION_LOCK), self.lock_timeout)?)
    }
}

#[cfg(test)]
mod tests {
    use ghd_core::MessageDraft;

    use super::*;

    fn registry() -> (tempfile::TempDir, SessionRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(dir.path(), Duration::from_secs(5));
        (dir, registry)
    }

    fn key(owner: &str, repo: &str, issue: u64) -> SessionKey {
        SessionKey::new(owner, repo, issue).unwrap()
    }

    fn snapshot(title: &str) -> IssueSnapshot {
        IssueSnapshot {
            title: title.into(),
            url: "https://github.com/acme/widgets/issues/7".into(),
            body: "Issue body".into(),
            author: Some("octo".into()),
        }
    }

    #[test]
    fn test_start_creates_then_loads() {
        let (_dir, registry) = registry();
        let key = key("acme", "widgets", 7);

        let (handle, created) = registry.start(&key, Some(&snapshot("First"))).unwrap();
        assert!(created);
        assert!(handle.messages_dir().is_dir());
        assert_eq!(handle.load().unwrap().issue_title, "First");

        let (_, created) = registry.start(&key, None).unwrap();
        assert!(!created);
    }

    #[test]
    fn test_restart_refreshes_metadata_but_keeps_state() {
        let (_dir, registry) = registry();
        let key = key("acme", "widgets", 7);
        let (handle, _) = registry.start(&key, Some(&snapshot("Old title"))).unwrap();
        handle.register_agent("alice", Some("Architect")).unwrap();
        handle.advance_cursor("alice", 4).unwrap();
        handle.messages().unwrap().append(MessageDraft::new("alice", "kept")).unwrap();

        let (handle, created) = registry.start(&key, Some(&snapshot("New title"))).unwrap();
        assert!(!created);
        let session = handle.load().unwrap();
        assert_eq!(session.issue_title, "New title");
        assert_eq!(session.cursor("alice"), 4);
        assert_eq!(session.agent("alice").unwrap().role.as_deref(), Some("Architect"));
        assert_eq!(handle.messages().unwrap().read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_create_rejects_existing() {
        let (_dir, registry) = registry();
        let key = key("acme", "widgets", 7);
        registry.create(&key, None).unwrap();

        let err = registry.create(&key, None).unwrap_err();
        assert!(matches!(err, RegistryError::SessionAlreadyExists(_)));
        assert_eq!(err.code(), "SESSION_EXISTS");
    }

    #[test]
    fn test_find_full_and_bare() {
        let (_dir, registry) = registry();
        registry.start(&key("acme", "widgets", 7), None).unwrap();

        let by_key = registry
            .find(&SessionIdent::Full(key("acme", "widgets", 7)))
            .unwrap();
        assert_eq!(by_key.key().to_string(), "acme/widgets#7");

        let by_issue = registry.find(&SessionIdent::Issue(7)).unwrap();
        assert_eq!(by_issue.key(), by_key.key());
    }

    #[test]
    fn test_find_missing() {
        let (_dir, registry) = registry();
        let err = registry
            .find(&SessionIdent::Full(key("acme", "widgets", 1)))
            .unwrap_err();
        assert_eq!(err.code(), "NO_SESSION");

        let err = registry.find(&SessionIdent::Issue(1)).unwrap_err();
        assert!(matches!(err, RegistryError::SessionNotFound(_)));
    }

    #[test]
    fn test_find_ambiguous_lists_candidates() {
        let (_dir, registry) = registry();
        registry.start(&key("acme", "widgets", 7), None).unwrap();
        registry.start(&key("octo", "tools", 7), None).unwrap();

        let err = registry.find(&SessionIdent::Issue(7)).unwrap_err();
        match &err {
            RegistryError::AmbiguousSession { issue, candidates } => {
                assert_eq!(*issue, 7);
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("acme/widgets#7"));
        assert!(message.contains("octo/tools#7"));
    }

    #[test]
    fn test_index_sees_sessions_created_by_this_registry() {
        let (_dir, registry) = registry();
        assert!(registry.find(&SessionIdent::Issue(3)).is_err());

        registry.start(&key("acme", "widgets", 3), None).unwrap();
        assert!(registry.find(&SessionIdent::Issue(3)).is_ok());
    }

    #[test]
    fn test_register_agent_never_blanks_role() {
        let (_dir, registry) = registry();
        let (handle, _) = registry.start(&key("acme", "widgets", 7), None).unwrap();

        let state = handle.register_agent("alice", None).unwrap();
        assert_eq!(state, AgentState::default());

        handle.register_agent("alice", Some("Reviewer")).unwrap();
        handle.register_agent("alice", None).unwrap();
        let state = handle.register_agent("alice", Some("  ")).unwrap();
        assert_eq!(state.role.as_deref(), Some("Reviewer"));

        let state = handle.register_agent("alice", Some("Lead")).unwrap();
        assert_eq!(state.role.as_deref(), Some("Lead"));
    }

    #[test]
    fn test_register_agent_rejects_bad_names() {
        let (_dir, registry) = registry();
        let (handle, _) = registry.start(&key("acme", "widgets", 7), None).unwrap();
        let err = handle.register_agent("bad name", None).unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGS");
    }

    #[test]
    fn test_cursor_never_moves_back() {
        let (_dir, registry) = registry();
        let (handle, _) = registry.start(&key("acme", "widgets", 7), None).unwrap();

        assert_eq!(handle.advance_cursor("alice", 3).unwrap(), 3);
        assert_eq!(handle.advance_cursor("alice", 1).unwrap(), 3);
        assert_eq!(handle.load().unwrap().cursor("alice"), 3);
    }

    #[test]
    fn test_remove_agent() {
        let (_dir, registry) = registry();
        let (handle, _) = registry.start(&key("acme", "widgets", 7), None).unwrap();
        handle.register_agent("alice", None).unwrap();

        assert!(handle.remove_agent("alice").unwrap());
        assert!(!handle.remove_agent("alice").unwrap());
        assert!(handle.load().unwrap().agents.is_empty());
    }

    #[test]
    fn test_list_returns_every_session() {
        let (_dir, registry) = registry();
        registry.start(&key("acme", "widgets", 7), None).unwrap();
        registry.start(&key("acme", "widgets", 8), None).unwrap();

        let sessions = registry.list().unwrap();
        assert_eq!(sessions.len(), 2);
    }
}
