//! Merge between the local message log and the remote issue thread.

use std::collections::HashSet;

use ghd_core::{
    IssueTracker, LocalMessage, MessageDraft, MessageStore, RemoteComment, is_valid_agent_name,
};
use ghd_session::SessionHandle;

use crate::{SyncError, marker};

const MAX_AUTHOR_NAME: usize = 64;

/// Imports remote comments and pushes local messages for one tracker.
#[derive(Debug)]
pub struct SyncEngine<T> {
    tracker: T,
}

impl<T: IssueTracker> SyncEngine<T> {
    /// Create an engine over `tracker`.
    #[must_use]
    pub const fn new(tracker: T) -> Self {
        Self { tracker }
    }

    /// The underlying tracker.
    #[must_use]
    pub const fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Import remote comments into the session's log.
    ///
    /// Returns the last seq assigned, or 0 when nothing was new.
    ///
    /// # Errors
    /// Returns error if the log cannot be locked, read or written.
    pub fn import_remote(
        &self,
        handle: &SessionHandle,
        comments: &[RemoteComment],
    ) -> Result<u64, SyncError> {
        import_remote(&handle.messages()?, comments)
    }

    /// Post `message` to the remote thread and record the comment id.
    ///
    /// The local message is kept whatever happens remotely. A pull that ran
    /// between the post and the id being recorded may already have linked
    /// the message; that is not an error.
    ///
    /// # Errors
    /// Returns error if the remote call fails or the id cannot be recorded.
    pub async fn push(
        &self,
        handle: &SessionHandle,
        message: &LocalMessage,
    ) -> Result<RemoteComment, SyncError> {
        let key = handle.key();
        let body = marker::encode(&message.agent, message.role.as_deref(), &message.body);
        let comment = self
            .tracker
            .create_comment(&key.owner, &key.repo, key.issue, &body)
            .await?;
        let store = handle.messages()?;
        let (seq, id) = (message.seq, comment.id);
        blocking(move || Ok(store.patch_remote_id(seq, id)?)).await?;
        tracing::debug!(session = %key, seq = message.seq, comment = comment.id, "Pushed message");
        Ok(comment)
    }

    /// Fetch the remote thread and import anything new.
    ///
    /// Returns the last seq assigned, or 0 when nothing was new.
    ///
    /// # Errors
    /// Returns error if the remote fetch or the import fails.
    pub async fn pull(&self, handle: &SessionHandle) -> Result<u64, SyncError> {
        let key = handle.key();
        let comments = self
            .tracker
            .fetch_comments(&key.owner, &key.repo, key.issue)
            .await?;
        let store = handle.messages()?;
        let last = blocking(move || import_remote(&store, &comments)).await?;
        if last > 0 {
            tracing::debug!(session = %key, last, "Imported remote comments");
        }
        Ok(last)
    }
}

/// Run store work on the blocking pool; lock waits sleep the thread.
pub(crate) async fn blocking<R, F>(work: F) -> Result<R, SyncError>
where
    F: FnOnce() -> Result<R, SyncError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Append every comment whose id is not yet in `store`.
///
/// Comments are taken in `(created_at, id)` order. The whole batch runs
/// under the store lock, so concurrent importers never duplicate a comment.
/// An agent comment matching a local message that has no comment id yet
/// (same agent and body, push still in flight) is linked to that message
/// instead of being appended again.
///
/// # Errors
/// Returns error if the log cannot be locked, read or written.
pub fn import_remote(store: &MessageStore, comments: &[RemoteComment]) -> Result<u64, SyncError> {
    let mut ordered: Vec<&RemoteComment> = comments.iter().collect();
    ordered.sort_by_key(|c| (c.created_at, c.id));

    let guard = store.lock()?;
    let local = guard.store().read_all()?;
    let mut known: HashSet<u64> = local.iter().filter_map(|m| m.remote_id).collect();
    let mut unlinked: Vec<&LocalMessage> = local.iter().filter(|m| m.remote_id.is_none()).collect();
    let mut last = 0;
    for comment in ordered {
        if !known.insert(comment.id) {
            continue;
        }
        let decoded = marker::decode(&comment.body);
        if let Some(agent) = decoded.agent.as_deref() {
            let pending = unlinked
                .iter()
                .position(|m| m.agent == agent && m.body.trim_end() == decoded.body.trim_end());
            if let Some(pos) = pending {
                let seq = unlinked.remove(pos).seq;
                guard.patch_remote_id(seq, comment.id)?;
                tracing::debug!(seq, comment = comment.id, "Linked local message to its remote comment");
                continue;
            }
        }
        let agent = decoded
            .agent
            .unwrap_or_else(|| agent_name_for_author(&comment.author));
        let draft = MessageDraft::new(agent, decoded.body)
            .with_role(decoded.role.as_deref())
            .at(comment.created_at)
            .with_remote_id(comment.id);
        last = guard.append(draft)?.seq;
    }
    Ok(last)
}

/// Turn a remote login into a usable agent name (`dependabot[bot]` becomes
/// `dependabot_bot`).
fn agent_name_for_author(author: &str) -> String {
    let mapped: String = author
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed: String = mapped
        .trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
        .trim_end_matches('_')
        .chars()
        .take(MAX_AUTHOR_NAME)
        .collect();
    if is_valid_agent_name(&trimmed) {
        trimmed
    } else {
        "unknown".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;

    fn store() -> (tempfile::TempDir, MessageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::open(dir.path().join("messages"), Duration::from_secs(5)).unwrap();
        (dir, store)
    }

    fn comment(id: u64, minute: u32, author: &str, body: &str) -> RemoteComment {
        RemoteComment {
            id,
            author: author.into(),
            body: body.into(),
            created_at: Utc.with_ymd_and_hms(2026, 10, 18, 12, minute, 0).unwrap(),
            url: format!("https://github.com/acme/widgets/issues/7#issuecomment-{id}"),
        }
    }

    #[test]
    fn test_import_orders_by_time_then_id() {
        let (_dir, store) = store();
        let comments = vec![
            comment(30, 2, "octo", "third"),
            comment(20, 1, "octo", "second"),
            comment(10, 1, "octo", "first"),
        ];

        assert_eq!(import_remote(&store, &comments).unwrap(), 3);
        let log = store.read_all().unwrap();
        assert_eq!(
            log.iter().map(|m| m.body.as_str()).collect::<Vec<_>>(),
            vec!["first", "second", "third"]
        );
        assert_eq!(log[0].remote_id, Some(10));
        assert_eq!(log[0].time, comments[2].created_at);
    }

    #[test]
    fn test_import_is_idempotent() {
        let (_dir, store) = store();
        let comments = vec![comment(1, 0, "octo", "a"), comment(2, 1, "octo", "b")];

        assert_eq!(import_remote(&store, &comments).unwrap(), 2);
        let first = store.read_all().unwrap();
        assert_eq!(import_remote(&store, &comments).unwrap(), 0);
        assert_eq!(store.read_all().unwrap(), first);

        let mut more = comments.clone();
        more.push(comment(3, 2, "octo", "c"));
        more.push(comment(3, 2, "octo", "c"));
        assert_eq!(import_remote(&store, &more).unwrap(), 3);
        assert_eq!(store.read_all().unwrap().len(), 3);
    }

    #[test]
    fn test_import_skips_pushed_messages() {
        let (_dir, store) = store();
        let local = store.append(MessageDraft::new("alice", "mine")).unwrap();
        store.patch_remote_id(local.seq, 42).unwrap();

        let body = marker::encode("alice", None, "mine");
        assert_eq!(import_remote(&store, &[comment(42, 0, "bot", &body)]).unwrap(), 0);
        assert_eq!(store.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_import_links_message_while_push_is_in_flight() {
        let (_dir, store) = store();
        // Sender appended and posted, but has not recorded the comment id yet.
        let local = store.append(MessageDraft::new("alice", "Proposal A")).unwrap();
        let posted = comment(1000, 0, "ghd-bot", &marker::encode("alice", None, "Proposal A"));

        // Another process pulls in that window.
        assert_eq!(import_remote(&store, std::slice::from_ref(&posted)).unwrap(), 0);
        let log = store.read_all().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].remote_id, Some(1000));

        // The sender catches up.
        assert!(!store.patch_remote_id(local.seq, 1000).unwrap());
        assert_eq!(import_remote(&store, &[posted]).unwrap(), 0);
        assert_eq!(store.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_import_does_not_link_other_authors() {
        let (_dir, store) = store();
        store.append(MessageDraft::new("alice", "Proposal A")).unwrap();

        let comments = [
            comment(1, 0, "octo", "Proposal A"),
            comment(2, 1, "ghd-bot", &marker::encode("bob", None, "Proposal A")),
        ];
        assert_eq!(import_remote(&store, &comments).unwrap(), 3);

        let log = store.read_all().unwrap();
        assert_eq!(log[0].remote_id, None);
        assert_eq!(log[1].agent, "octo");
        assert_eq!(log[2].agent, "bob");
    }

    #[test]
    fn test_import_links_each_pending_message_once() {
        let (_dir, store) = store();
        store.append(MessageDraft::new("alice", "+1")).unwrap();
        store.append(MessageDraft::new("alice", "+1")).unwrap();

        let body = marker::encode("alice", None, "+1");
        let comments = [comment(5, 0, "ghd-bot", &body), comment(6, 1, "ghd-bot", &body)];
        assert_eq!(import_remote(&store, &comments).unwrap(), 0);

        let log = store.read_all().unwrap();
        assert_eq!(
            log.iter().map(|m| m.remote_id).collect::<Vec<_>>(),
            vec![Some(5), Some(6)]
        );
    }

    #[test]
    fn test_import_uses_marker_or_author() {
        let (_dir, store) = store();
        let tagged = marker::encode("claude", Some("Reviewer"), "LGTM");
        import_remote(
            &store,
            &[
                comment(1, 0, "ghd-bot", &tagged),
                comment(2, 1, "renovate[bot]", "Bump deps"),
            ],
        )
        .unwrap();

        let log = store.read_all().unwrap();
        assert_eq!(log[0].agent, "claude");
        assert_eq!(log[0].role.as_deref(), Some("Reviewer"));
        assert_eq!(log[0].body, "LGTM");
        assert_eq!(log[1].agent, "renovate_bot");
        assert_eq!(log[1].role, None);
        assert_eq!(log[1].body, "Bump deps");
    }

    #[test]
    fn test_agent_name_for_author() {
        assert_eq!(agent_name_for_author("octocat"), "octocat");
        assert_eq!(agent_name_for_author("dependabot[bot]"), "dependabot_bot");
        assert_eq!(agent_name_for_author("[]"), "unknown");
        assert_eq!(agent_name_for_author(""), "unknown");
    }
}
