//! Discussion orchestration used by the `ghd` commands.

use std::{collections::BTreeMap, time::Duration};

use futures::{
    FutureExt,
    future::{Fuse, FusedFuture},
};
use ghd_core::{
    IssueTracker, LocalMessage, MessageDraft, RemoteError, is_valid_agent_name,
};
use ghd_session::{
    AgentState, IssueSnapshot, Session, SessionHandle, SessionIdent, SessionKey, SessionRegistry,
};

use crate::{
    SyncEngine, SyncError,
    engine::blocking,
    watch::{self, WaitOutcome},
};

/// Result of joining a session.
#[derive(Debug, Clone)]
pub struct StartReport {
    pub handle: SessionHandle,
    pub session: Session,
    /// Whether the session was created by this call.
    pub created: bool,
    /// The joining agent's state after registration.
    pub agent: AgentState,
    /// Number of remote comments imported while joining.
    pub imported: usize,
    /// Why the remote could not be reached, if it could not.
    pub remote_warning: Option<String>,
}

/// Result of sending a message.
#[derive(Debug, Clone)]
pub struct SendReport {
    pub message: LocalMessage,
    /// URL of the remote comment, when the push succeeded.
    pub remote_url: Option<String>,
    /// Why the push failed, when it did. The message is kept locally.
    pub remote_warning: Option<String>,
}

/// Orchestrates sessions, the local log and remote sync.
pub struct Discussion<T>
where
    T: IssueTracker,
{
    registry: SessionRegistry,
    engine: SyncEngine<T>,
}

impl<T> Discussion<T>
where
    T: IssueTracker,
{
    /// Create a discussion over a registry and a remote tracker.
    #[must_use]
    pub const fn new(registry: SessionRegistry, tracker: T) -> Self {
        Self {
            registry,
            engine: SyncEngine::new(tracker),
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn engine(&self) -> &SyncEngine<T> {
        &self.engine
    }

    /// Join (creating if needed) the session for an existing remote issue.
    ///
    /// The issue is looked up first; a missing issue fails the call, while an
    /// unreachable remote only leaves the cached metadata as it was.
    ///
    /// # Errors
    /// Returns `InvalidArguments` for an unusable agent name, the remote
    /// error when the issue does not exist, or a storage error.
    pub async fn start(
        &self,
        key: &SessionKey,
        agent: &str,
        role: Option<&str>,
    ) -> Result<StartReport, SyncError> {
        check_agent(agent)?;

        let (snapshot, mut remote_warning) = match self
            .engine
            .tracker()
            .fetch_issue(&key.owner, &key.repo, key.issue)
            .await
        {
            Ok(issue) => (Some(IssueSnapshot::from(&issue)), None),
            Err(err @ RemoteError::IssueNotFound { .. }) => return Err(err.into()),
            Err(err) => {
                warn_remote(key, "fetch issue", &err);
                (None, Some(err.to_string()))
            }
        };

        let (handle, created) = self.registry.start(key, snapshot.as_ref())?;
        let state = handle.register_agent(agent, role)?;

        let imported = if remote_warning.is_none() {
            match self.pull_counted(&handle).await {
                Ok(count) => count,
                Err(err) => {
                    tracing::warn!(session = %key, error = %err, "Remote pull failed");
                    remote_warning = Some(err.to_string());
                    0
                }
            }
        } else {
            0
        };

        Ok(StartReport {
            session: handle.load()?,
            handle,
            created,
            agent: state,
            imported,
            remote_warning,
        })
    }

    /// Open a new remote issue and start a session on it.
    ///
    /// # Errors
    /// Returns `InvalidArguments` for an empty title or unusable agent name,
    /// the remote error if the issue cannot be created, or
    /// `SessionAlreadyExists` if a session for the new number is already on
    /// disk.
    pub async fn start_new_issue(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
        agent: &str,
        role: Option<&str>,
    ) -> Result<StartReport, SyncError> {
        check_agent(agent)?;
        if title.trim().is_empty() {
            return Err(SyncError::InvalidArguments(
                "A title is required to open a new issue".into(),
            ));
        }
        // Reject bad owner/repo before touching the remote.
        SessionKey::new(owner, repo, 1)?;

        let issue = self
            .engine
            .tracker()
            .create_issue(owner, repo, title, body)
            .await?;
        tracing::info!(owner, repo, number = issue.number, "Created issue");

        let key = SessionKey::new(owner, repo, issue.number)?;
        let handle = self
            .registry
            .create(&key, Some(&IssueSnapshot::from(&issue)))?;
        let state = handle.register_agent(agent, role)?;

        Ok(StartReport {
            session: handle.load()?,
            handle,
            created: true,
            agent: state,
            imported: 0,
            remote_warning: None,
        })
    }

    /// Resolve a session identifier.
    ///
    /// # Errors
    /// Returns `SessionNotFound` or `AmbiguousSession`.
    pub fn find(&self, ident: &SessionIdent) -> Result<SessionHandle, SyncError> {
        Ok(self.registry.find(ident)?)
    }

    /// Append a message and push it to the remote thread.
    ///
    /// Without an explicit role the agent's registered role is used. The
    /// sender's cursor does not move.
    ///
    /// # Errors
    /// Returns `InvalidArguments` for an empty body or unusable agent name,
    /// or a storage error. Remote failures are reported in the result.
    pub async fn send(
        &self,
        handle: &SessionHandle,
        agent: &str,
        role: Option<&str>,
        body: &str,
    ) -> Result<SendReport, SyncError> {
        check_agent(agent)?;
        if body.trim().is_empty() {
            return Err(SyncError::InvalidArguments(
                "No message provided. Pass --message or pipe it on stdin.".into(),
            ));
        }

        let state = handle.register_agent(agent, role)?;
        let store = handle.messages()?;
        let draft = MessageDraft::new(agent, body).with_role(state.role.as_deref());
        let message = blocking(move || Ok(store.append(draft)?)).await?;
        tracing::debug!(session = %handle.key(), seq = message.seq, agent, "Appended message");

        let (remote_url, remote_warning) = match self.engine.push(handle, &message).await {
            Ok(comment) => (Some(comment.url), None),
            Err(err) => {
                tracing::warn!(session = %handle.key(), seq = message.seq, error = %err, "Message kept locally; push failed");
                (None, Some(err.to_string()))
            }
        };

        Ok(SendReport {
            message,
            remote_url,
            remote_warning,
        })
    }

    /// Messages from other agents since `agent`'s cursor.
    ///
    /// With `last`, only the newest `last` of them are returned. The cursor
    /// moves to the last returned seq.
    ///
    /// # Errors
    /// Returns error if the log or session cannot be read or updated.
    pub async fn recv(
        &self,
        handle: &SessionHandle,
        agent: &str,
        last: Option<usize>,
        sync: bool,
    ) -> Result<Vec<LocalMessage>, SyncError> {
        check_agent(agent)?;
        if sync {
            self.pull_best_effort(handle).await;
        }

        let cursor = handle.load()?.cursor(agent);
        let store = handle.messages()?;
        let mut messages: Vec<_> = store
            .read_after(cursor)?
            .into_iter()
            .filter(|m| !m.is_from(agent))
            .collect();
        if let Some(n) = last {
            let skip = messages.len().saturating_sub(n);
            messages.drain(..skip);
        }
        if let Some(newest) = messages.last() {
            handle.advance_cursor(agent, newest.seq)?;
        }
        Ok(messages)
    }

    /// The whole log, or its newest `last` entries. Cursors are untouched.
    ///
    /// # Errors
    /// Returns error if the log cannot be read.
    pub fn log(
        &self,
        handle: &SessionHandle,
        last: Option<usize>,
    ) -> Result<Vec<LocalMessage>, SyncError> {
        let mut messages = handle.messages()?.read_all()?;
        if let Some(n) = last {
            let skip = messages.len().saturating_sub(n);
            messages.drain(..skip);
        }
        Ok(messages)
    }

    /// Block until another agent writes after `agent`'s cursor.
    ///
    /// The remote thread is pulled every `interval` while waiting. Pulls run
    /// alongside the wait, so a slow remote never delays the deadline or a
    /// local append. On success the cursor moves to the last returned seq.
    ///
    /// # Errors
    /// Returns `Timeout` if nothing arrives within `timeout`.
    pub async fn wait(
        &self,
        handle: &SessionHandle,
        agent: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Vec<LocalMessage>, SyncError> {
        check_agent(agent)?;
        check_interval(interval)?;

        let cursor = handle.load()?.cursor(agent);
        let store = handle.messages()?;
        let waiting = watch::wait_for_next(&store, agent, cursor, timeout);
        tokio::pin!(waiting);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // At most one pull in flight; dropped unfinished when the wait ends.
        let pull = Fuse::terminated();
        tokio::pin!(pull);

        let outcome = loop {
            tokio::select! {
                biased;
                outcome = &mut waiting => break outcome?,
                () = &mut pull, if !pull.is_terminated() => {}
                _ = ticker.tick(), if pull.is_terminated() => {
                    pull.set(self.pull_best_effort(handle).fuse());
                }
            }
        };

        match outcome {
            WaitOutcome::Satisfied(messages) => {
                if let Some(newest) = messages.last() {
                    handle.advance_cursor(agent, newest.seq)?;
                }
                Ok(messages)
            }
            WaitOutcome::TimedOut => Err(SyncError::Timeout { waited: timeout }),
        }
    }

    /// Block until another agent's cursor moves.
    ///
    /// # Errors
    /// Returns `Timeout` if no cursor moves within `timeout`.
    pub async fn wait_for_read(
        &self,
        handle: &SessionHandle,
        agent: &str,
        timeout: Duration,
    ) -> Result<BTreeMap<String, u64>, SyncError> {
        check_agent(agent)?;
        match watch::wait_for_other_cursor_change(handle, agent, timeout).await? {
            WaitOutcome::Satisfied(cursors) => Ok(cursors),
            WaitOutcome::TimedOut => Err(SyncError::Timeout { waited: timeout }),
        }
    }

    /// Current state of one session.
    ///
    /// # Errors
    /// Returns error if the record cannot be read.
    pub fn status(&self, handle: &SessionHandle) -> Result<Session, SyncError> {
        Ok(handle.load()?)
    }

    /// Every session in the store, most recently updated first.
    ///
    /// # Errors
    /// Returns error if the store cannot be listed.
    pub fn list(&self) -> Result<Vec<Session>, SyncError> {
        Ok(self.registry.list()?)
    }

    /// Remove `agent` from the session. Messages stay in the log.
    ///
    /// # Errors
    /// Returns error if the record cannot be updated.
    pub fn end(&self, handle: &SessionHandle, agent: &str) -> Result<bool, SyncError> {
        let removed = handle.remove_agent(agent)?;
        if removed {
            tracing::info!(session = %handle.key(), agent, "Agent left session");
        }
        Ok(removed)
    }

    /// Pull and count the messages that landed.
    async fn pull_counted(&self, handle: &SessionHandle) -> Result<usize, SyncError> {
        let before = handle.messages()?.last_seq()?;
        let last = self.engine.pull(handle).await?;
        Ok(usize::try_from(last.saturating_sub(before)).unwrap_or(usize::MAX))
    }

    /// Pull, downgrading failures to log lines.
    async fn pull_best_effort(&self, handle: &SessionHandle) {
        if let Err(err) = self.engine.pull(handle).await {
            match err {
                SyncError::Remote(ref remote) => warn_remote(handle.key(), "pull", remote),
                other => tracing::warn!(session = %handle.key(), error = %other, "Remote pull failed"),
            }
        }
    }
}

fn warn_remote(key: &SessionKey, action: &str, err: &RemoteError) {
    if matches!(err, RemoteError::Offline) {
        tracing::debug!(session = %key, action, "Remote offline; skipping");
    } else {
        tracing::warn!(session = %key, action, error = %err, "Remote sync failed");
    }
}

fn check_agent(agent: &str) -> Result<(), SyncError> {
    if is_valid_agent_name(agent) {
        Ok(())
    } else {
        Err(SyncError::InvalidArguments(format!(
            "Invalid agent name {agent:?}: use letters, digits, '-', '_' or '.'"
        )))
    }
}

fn check_interval(interval: Duration) -> Result<(), SyncError> {
    if interval.is_zero() {
        return Err(SyncError::InvalidArguments(
            "Poll interval must be greater than zero".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use ghd_core::{RemoteComment, RemoteIssue};
    use ghd_remote::{GhClient, MemoryTracker, OfflineTracker};

    use super::*;

    fn discussion<T: IssueTracker>(tracker: T) -> (tempfile::TempDir, Discussion<T>) {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(dir.path(), Duration::from_secs(5));
        (dir, Discussion::new(registry, tracker))
    }

    fn key() -> SessionKey {
        SessionKey::new("acme", "widgets", 7).unwrap()
    }

    #[tokio::test]
    async fn test_start_missing_issue_fails() {
        let (_dir, discussion) = discussion(MemoryTracker::default());
        let err = discussion.start(&key(), "alice", None).await.unwrap_err();
        assert_eq!(err.code(), "ISSUE_NOT_FOUND");
        assert!(discussion.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_imports_existing_thread() {
        let tracker = Arc::new(MemoryTracker::default());
        tracker.insert_issue("acme", "widgets", 7, "Widgets v2");
        tracker.add_comment("acme", "widgets", 7, "octo", "Context from a human");
        let (_dir, discussion) = discussion(Arc::clone(&tracker));

        let report = discussion.start(&key(), "alice", Some("Architect")).await.unwrap();
        assert!(report.created);
        assert_eq!(report.imported, 1);
        assert_eq!(report.session.issue_title, "Widgets v2");
        assert_eq!(report.agent.role.as_deref(), Some("Architect"));
        assert!(report.remote_warning.is_none());
    }

    #[tokio::test]
    async fn test_start_offline_still_creates_session() {
        let (_dir, discussion) = discussion(OfflineTracker);
        let report = discussion.start(&key(), "alice", None).await.unwrap();
        assert!(report.created);
        assert!(report.remote_warning.is_some());
        assert_eq!(report.session.issue_title, "");
    }

    #[tokio::test]
    async fn test_start_without_gh_still_creates_session() {
        let (_dir, discussion) = discussion(GhClient::new("definitely-not-a-real-gh-binary"));
        let report = discussion.start(&key(), "alice", None).await.unwrap();
        assert!(report.created);
        let warning = report.remote_warning.unwrap();
        assert!(warning.contains("GitHub CLI not found"), "{warning}");
    }

    #[tokio::test]
    async fn test_start_rejects_bad_agent() {
        let (_dir, discussion) = discussion(OfflineTracker);
        let err = discussion.start(&key(), "no spaces", None).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGS");
    }

    #[tokio::test]
    async fn test_send_pushes_and_records_comment_id() {
        let tracker = Arc::new(MemoryTracker::default());
        tracker.insert_issue("acme", "widgets", 7, "Widgets");
        let (_dir, discussion) = discussion(Arc::clone(&tracker));
        let handle = discussion.start(&key(), "alice", Some("Architect")).await.unwrap().handle;

        let report = discussion.send(&handle, "alice", None, "Proposal A").await.unwrap();
        assert_eq!(report.message.seq, 1);
        assert_eq!(report.message.role.as_deref(), Some("Architect"));
        assert!(report.remote_url.is_some());

        let remote = tracker.comments("acme", "widgets", 7);
        assert_eq!(remote.len(), 1);
        assert!(remote[0].body.starts_with("<!-- ghd:v1 agent:alice role:Architect -->"));
        let stored = handle.messages().unwrap().get(1).unwrap().unwrap();
        assert_eq!(stored.remote_id, Some(remote[0].id));

        // The pushed comment is not imported a second time.
        discussion.recv(&handle, "bob", None, true).await.unwrap();
        assert_eq!(handle.messages().unwrap().read_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_keeps_message_when_push_fails() {
        let tracker = Arc::new(MemoryTracker::default());
        tracker.insert_issue("acme", "widgets", 7, "Widgets");
        let (_dir, discussion) = discussion(Arc::clone(&tracker));
        let handle = discussion.start(&key(), "alice", None).await.unwrap().handle;
        tracker.set_fail_writes(true);

        let report = discussion.send(&handle, "alice", None, "offline thought").await.unwrap();
        assert!(report.remote_url.is_none());
        assert!(report.remote_warning.is_some());
        let stored = handle.messages().unwrap().get(report.message.seq).unwrap().unwrap();
        assert_eq!(stored.remote_id, None);
    }

    #[tokio::test]
    async fn test_send_rejects_empty_body() {
        let (_dir, discussion) = discussion(OfflineTracker);
        let handle = discussion.start(&key(), "alice", None).await.unwrap().handle;
        let err = discussion.send(&handle, "alice", None, "  \n").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGS");
        assert_eq!(handle.messages().unwrap().last_seq().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recv_last_n_moves_cursor_to_newest() {
        let (_dir, discussion) = discussion(OfflineTracker);
        let handle = discussion.start(&key(), "alice", None).await.unwrap().handle;
        for body in ["one", "two", "three"] {
            discussion.send(&handle, "bob", None, body).await.unwrap();
        }

        let messages = discussion.recv(&handle, "alice", Some(2), false).await.unwrap();
        assert_eq!(
            messages.iter().map(|m| m.body.as_str()).collect::<Vec<_>>(),
            vec!["two", "three"]
        );
        assert_eq!(handle.load().unwrap().cursor("alice"), 3);
        assert!(discussion.recv(&handle, "alice", None, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_log_keeps_cursors() {
        let (_dir, discussion) = discussion(OfflineTracker);
        let handle = discussion.start(&key(), "alice", None).await.unwrap().handle;
        discussion.send(&handle, "alice", None, "a").await.unwrap();
        discussion.send(&handle, "bob", None, "b").await.unwrap();

        assert_eq!(discussion.log(&handle, None).unwrap().len(), 2);
        assert_eq!(discussion.log(&handle, Some(1)).unwrap()[0].body, "b");
        assert_eq!(handle.load().unwrap().cursor("alice"), 0);
    }

    #[tokio::test]
    async fn test_wait_pulls_remote_replies() {
        let tracker = Arc::new(MemoryTracker::default());
        tracker.insert_issue("acme", "widgets", 7, "Widgets");
        let (_dir, discussion) = discussion(Arc::clone(&tracker));
        let handle = discussion.start(&key(), "alice", None).await.unwrap().handle;

        let remote = Arc::clone(&tracker);
        let reply = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            remote.add_comment("acme", "widgets", 7, "octo", "Human reply");
        });

        let messages = discussion
            .wait(&handle, "alice", Duration::from_secs(5), Duration::from_millis(50))
            .await
            .unwrap();
        reply.await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].agent, "octo");
        assert_eq!(handle.load().unwrap().cursor("alice"), messages[0].seq);
    }

    /// Tracker whose comment fetch hangs for `delay`.
    struct SlowTracker {
        delay: Duration,
    }

    #[async_trait]
    impl IssueTracker for SlowTracker {
        async fn fetch_issue(&self, _: &str, _: &str, _: u64) -> Result<RemoteIssue, RemoteError> {
            Err(RemoteError::Offline)
        }

        async fn fetch_comments(
            &self,
            _: &str,
            _: &str,
            _: u64,
        ) -> Result<Vec<RemoteComment>, RemoteError> {
            tokio::time::sleep(self.delay).await;
            Ok(Vec::new())
        }

        async fn create_comment(
            &self,
            _: &str,
            _: &str,
            _: u64,
            _: &str,
        ) -> Result<RemoteComment, RemoteError> {
            Err(RemoteError::Offline)
        }

        async fn create_issue(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<RemoteIssue, RemoteError> {
            Err(RemoteError::Offline)
        }
    }

    fn slow_discussion() -> (tempfile::TempDir, Discussion<SlowTracker>, SessionHandle) {
        let (dir, discussion) = discussion(SlowTracker {
            delay: Duration::from_secs(3),
        });
        let (handle, _) = discussion.registry().start(&key(), None).unwrap();
        (dir, discussion, handle)
    }

    #[tokio::test]
    async fn test_wait_deadline_not_held_up_by_slow_pull() {
        let (_dir, discussion, handle) = slow_discussion();

        let started = std::time::Instant::now();
        let err = discussion
            .wait(&handle, "alice", Duration::from_millis(500), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TIMEOUT");
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_wait_sees_local_append_during_slow_pull() {
        let (_dir, discussion, handle) = slow_discussion();

        let store = handle.messages().unwrap();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            store.append(MessageDraft::new("bob", "Counter B")).unwrap();
        });

        let started = std::time::Instant::now();
        let messages = discussion
            .wait(&handle, "alice", Duration::from_secs(10), Duration::from_secs(1))
            .await
            .unwrap();
        writer.await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, "Counter B");
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_wait_rejects_zero_interval() {
        let (_dir, discussion) = discussion(OfflineTracker);
        let handle = discussion.start(&key(), "alice", None).await.unwrap().handle;
        let err = discussion
            .wait(&handle, "alice", Duration::from_secs(1), Duration::ZERO)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGS");
    }

    #[tokio::test]
    async fn test_start_new_issue() {
        let tracker = Arc::new(MemoryTracker::default());
        let (_dir, discussion) = discussion(Arc::clone(&tracker));

        let report = discussion
            .start_new_issue("acme", "widgets", "Design review", "Let's talk", "alice", None)
            .await
            .unwrap();
        assert_eq!(report.handle.key().issue, 1);
        assert_eq!(report.session.issue_title, "Design review");
        assert!(discussion.find(&SessionIdent::Issue(1)).is_ok());

        let err = discussion
            .start_new_issue("acme", "widgets", " ", "", "alice", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGS");
    }

    #[tokio::test]
    async fn test_end_removes_agent_only() {
        let (_dir, discussion) = discussion(OfflineTracker);
        let handle = discussion.start(&key(), "alice", None).await.unwrap().handle;
        discussion.send(&handle, "alice", None, "bye").await.unwrap();

        assert!(discussion.end(&handle, "alice").unwrap());
        assert!(!discussion.end(&handle, "alice").unwrap());
        assert!(discussion.status(&handle).unwrap().agents.is_empty());
        assert_eq!(discussion.log(&handle, None).unwrap().len(), 1);
    }
}
