//! Blocking waits on a session directory.
//!
//! Both waits follow the same shape: check, subscribe to filesystem events,
//! check again, then re-check on every event until the deadline passes.

use std::{collections::BTreeMap, path::Path, time::Duration};

use futures::StreamExt;
use ghd_core::{LocalMessage, MessageStore};
use ghd_session::SessionHandle;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::SyncError;

const EVENT_BUFFER: usize = 64;

/// How a wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Satisfied(T),
    TimedOut,
}

/// Directory change events as a stream.
///
/// Events carry no payload; a wakeup only means "look again". Bursts that
/// overflow the buffer are coalesced.
struct DirEvents {
    _watcher: RecommendedWatcher,
    events: ReceiverStream<()>,
}

impl DirEvents {
    fn watch(dir: &Path) -> Result<Self, SyncError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(_) => {
                    let _ = tx.try_send(());
                }
                Err(err) => tracing::debug!(error = %err, "File watcher reported an error"),
            }
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        tracing::debug!(dir = %dir.display(), "Watching directory");
        Ok(Self {
            _watcher: watcher,
            events: ReceiverStream::new(rx),
        })
    }

    async fn next(&mut self) -> Option<()> {
        self.events.next().await
    }
}

/// Run `check` until it yields a value or `timeout` passes.
async fn wait_on<T>(
    dir: &Path,
    timeout: Duration,
    mut check: impl FnMut() -> Option<T>,
) -> Result<WaitOutcome<T>, SyncError> {
    if let Some(found) = check() {
        return Ok(WaitOutcome::Satisfied(found));
    }

    let mut events = DirEvents::watch(dir)?;
    // A change between the first check and the subscription has no event.
    if let Some(found) = check() {
        return Ok(WaitOutcome::Satisfied(found));
    }

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => return Ok(WaitOutcome::TimedOut),
            Some(()) = events.next() => {
                if let Some(found) = check() {
                    return Ok(WaitOutcome::Satisfied(found));
                }
            }
        }
    }
}

/// Wait until a message from another agent lands after `cursor`.
///
/// Read errors while re-checking are logged and treated as "nothing yet".
///
/// # Errors
/// Returns error if the directory cannot be watched.
pub async fn wait_for_next(
    store: &MessageStore,
    agent: &str,
    cursor: u64,
    timeout: Duration,
) -> Result<WaitOutcome<Vec<LocalMessage>>, SyncError> {
    wait_on(store.dir(), timeout, || pending_from_others(store, agent, cursor)).await
}

/// Messages after `cursor` written by anyone but `agent`, if there are any.
pub(crate) fn pending_from_others(
    store: &MessageStore,
    agent: &str,
    cursor: u64,
) -> Option<Vec<LocalMessage>> {
    match store.read_after(cursor) {
        Ok(messages) => {
            let others: Vec<_> = messages.into_iter().filter(|m| !m.is_from(agent)).collect();
            (!others.is_empty()).then_some(others)
        }
        Err(err) => {
            tracing::debug!(error = %err, "Ignoring transient read error while waiting");
            None
        }
    }
}

/// Wait until another agent's cursor moves away from its current value.
///
/// Returns the other agents' cursors as they were when the change was seen.
///
/// # Errors
/// Returns error if the session cannot be read up front or its directory
/// cannot be watched.
pub async fn wait_for_other_cursor_change(
    handle: &SessionHandle,
    agent: &str,
    timeout: Duration,
) -> Result<WaitOutcome<BTreeMap<String, u64>>, SyncError> {
    let baseline = handle.load()?.other_cursors(agent);
    wait_on(handle.dir(), timeout, || {
        let current = match handle.load() {
            Ok(session) => session.other_cursors(agent),
            Err(err) => {
                tracing::debug!(error = %err, "Ignoring transient read error while waiting");
                return None;
            }
        };
        cursors_moved(&baseline, &current).then_some(current)
    })
    .await
}

fn cursors_moved(baseline: &BTreeMap<String, u64>, current: &BTreeMap<String, u64>) -> bool {
    current
        .iter()
        .any(|(name, cursor)| baseline.get(name).copied().unwrap_or(0) != *cursor)
}
