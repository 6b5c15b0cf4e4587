//! File-backed message store using JSONL.
//!
//! Each session lives in `<root>/<session>/messages.jsonl`, one message per
//! line, so several processes can share a session log. Writers take an
//! exclusive lock on a sidecar lock file; bulk delete rewrites the log via a
//! temp file and an atomic rename.
//!
//! Subscriptions re-read the log whenever it may have changed (an in-process
//! write or a filesystem event from another process) and diff the result
//! against what they last delivered.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::{validate_session_name, BatchStream, MessageStore, StoreError};
use crate::domain::{Change, ChangeBatch, Message};

const LOG_FILE: &str = "messages.jsonl";
const LOCK_FILE: &str = "messages.lock";

/// Debounce window for filesystem events from other processes
const WATCH_DEBOUNCE: Duration = Duration::from_millis(150);

/// JSONL message store rooted at a directory
pub struct JsonlMessageStore {
    /// Directory containing one subdirectory per session
    root: PathBuf,

    /// Bumped after every local write so subscriptions re-read promptly
    generation: watch::Sender<u64>,
}

impl JsonlMessageStore {
    /// Open a store rooted at `root` (created on first write)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            root: root.into(),
            generation,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a session's log
    pub fn session_dir(&self, session: &str) -> PathBuf {
        self.root.join(session)
    }

    /// Path to a session's log file
    pub fn log_path(&self, session: &str) -> PathBuf {
        self.session_dir(session).join(LOG_FILE)
    }

    async fn ensure_session_dir(&self, session: &str) -> Result<PathBuf, StoreError> {
        validate_session_name(session)?;
        let dir = self.session_dir(session);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    fn bump_generation(&self) {
        self.generation.send_modify(|g| *g = g.wrapping_add(1));
    }
}

#[async_trait]
impl MessageStore for JsonlMessageStore {
    async fn append(&self, session: &str, mut message: Message) -> Result<String, StoreError> {
        let dir = self.ensure_session_dir(session).await?;

        message.id = Uuid::new_v4().to_string();
        message.server_time = Some(Utc::now());
        let id = message.id.clone();

        let line = serde_json::to_string(&message)?;
        run_blocking(move || append_line(&dir, &line)).await?;

        tracing::debug!(session, %id, "Appended message");
        self.bump_generation();
        Ok(id)
    }

    async fn read_all(&self, session: &str) -> Result<Vec<Message>, StoreError> {
        validate_session_name(session)?;
        read_log(&self.log_path(session)).await
    }

    async fn subscribe(&self, session: &str) -> Result<BatchStream, StoreError> {
        let dir = self.ensure_session_dir(session).await?;
        let log_path = dir.join(LOG_FILE);

        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.generation.subscribe();

        tokio::spawn(run_subscription(dir, log_path, generation, tx));

        Ok(rx)
    }

    async fn delete_all(&self, session: &str, ids: &[String]) -> Result<(), StoreError> {
        let dir = self.ensure_session_dir(session).await?;
        let ids = ids.to_vec();

        let removed = run_blocking(move || rewrite_without(&dir, &ids)).await?;

        tracing::info!(session, removed, "Bulk-deleted messages");
        self.bump_generation();
        Ok(())
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("Store worker failed: {}", e)))?
}

/// Hold the session's exclusive lock for the duration of `f`
fn with_lock<T>(dir: &Path, f: impl FnOnce() -> Result<T, StoreError>) -> Result<T, StoreError> {
    let lock = OpenOptions::new()
        .create(true)
        .write(true)
        .open(dir.join(LOCK_FILE))?;
    lock.lock_exclusive()?;
    let result = f();
    let _ = lock.unlock();
    result
}

fn append_line(dir: &Path, line: &str) -> Result<(), StoreError> {
    with_lock(dir, || {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE))?;
        file.write_all(format!("{}\n", line).as_bytes())?;
        file.flush()?;
        Ok(())
    })
}

/// Rewrite the log without `ids`; fails without touching the log if any id is missing
fn rewrite_without(dir: &Path, ids: &[String]) -> Result<usize, StoreError> {
    with_lock(dir, || {
        let log_path = dir.join(LOG_FILE);
        let content = match std::fs::read_to_string(&log_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let messages = parse_log(&content);

        if let Some(missing) = ids.iter().find(|id| !messages.iter().any(|m| &m.id == *id)) {
            return Err(StoreError::NotFound(missing.clone()));
        }

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        let mut removed = 0;
        for message in &messages {
            if ids.contains(&message.id) {
                removed += 1;
                continue;
            }
            writeln!(temp, "{}", serde_json::to_string(message)?)?;
        }
        temp.flush()?;
        temp.persist(&log_path).map_err(|e| StoreError::Io(e.error))?;

        Ok(removed)
    })
}

/// Parse complete lines; a trailing fragment is a write still in progress.
///
/// Lines that do not parse are skipped so one bad writer cannot take the
/// session down; a rewrite drops them.
fn parse_log(content: &str) -> Vec<Message> {
    content
        .split_inclusive('\n')
        .enumerate()
        .filter(|(_, line)| line.ends_with('\n') && !line.trim().is_empty())
        .filter_map(|(i, line)| match serde_json::from_str(line) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(line = i + 1, error = %e, "Skipping malformed log line");
                None
            }
        })
        .collect()
}

async fn read_log(path: &Path) -> Result<Vec<Message>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(parse_log(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Compute the batch that takes `known` to `snapshot`, updating `known`
pub fn diff_snapshot(known: &mut HashMap<String, Message>, snapshot: Vec<Message>) -> ChangeBatch {
    let mut changes = Vec::new();
    let mut next: HashMap<String, Message> = HashMap::with_capacity(snapshot.len());

    for message in &snapshot {
        match known.get(&message.id) {
            None => changes.push(Change::added(message.clone())),
            Some(previous) if previous != message => changes.push(Change::modified(message.clone())),
            Some(_) => {}
        }
        next.insert(message.id.clone(), message.clone());
    }

    for (id, message) in known.drain() {
        if !next.contains_key(&id) {
            changes.push(Change::removed(message));
        }
    }

    *known = next;
    ChangeBatch { changes, snapshot }
}

/// Per-subscription loop: deliver the snapshot, then a batch per observed change
async fn run_subscription(
    dir: PathBuf,
    log_path: PathBuf,
    mut generation: watch::Receiver<u64>,
    tx: mpsc::UnboundedSender<Result<ChangeBatch, StoreError>>,
) {
    let (fs_tx, mut fs_rx) = mpsc::unbounded_channel();

    // Dropping the debouncer stops the watch, so keep it for the loop's lifetime
    let _debouncer = match new_debouncer(WATCH_DEBOUNCE, move |res| {
        let _ = fs_tx.send(res);
    }) {
        Ok(mut debouncer) => match debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive) {
            Ok(()) => Some(debouncer),
            Err(e) => {
                tracing::warn!("Cross-process watch unavailable for {}: {}", dir.display(), e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to create file watcher: {}", e);
            None
        }
    };

    let mut known = HashMap::new();

    match read_log(&log_path).await {
        Ok(snapshot) => {
            for message in &snapshot {
                known.insert(message.id.clone(), message.clone());
            }
            if tx.send(Ok(ChangeBatch::initial(snapshot))).is_err() {
                return;
            }
        }
        Err(e) => {
            let _ = tx.send(Err(e));
            return;
        }
    }

    loop {
        tokio::select! {
            _ = tx.closed() => break,
            changed = generation.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            Some(event) = fs_rx.recv() => {
                if let Err(e) = event {
                    tracing::debug!("File watcher error: {:?}", e);
                    continue;
                }
            }
        }

        match read_log(&log_path).await {
            Ok(snapshot) => {
                let batch = diff_snapshot(&mut known, snapshot);
                if batch.is_empty() {
                    continue;
                }
                if tx.send(Ok(batch)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Failed to re-read {}: {}", log_path.display(), e);
                if tx.send(Err(StoreError::Unavailable(e.to_string()))).is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Subscription on {} closed", log_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Author, ChangeKind, MessageKind, Role};
    use tempfile::TempDir;

    fn message(text: &str, local_time: u64) -> Message {
        Message::new(
            text,
            Role::Sender,
            MessageKind::Text,
            Author::new("u1", "Alice"),
            local_time,
        )
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let temp = TempDir::new().unwrap();
        let store = JsonlMessageStore::new(temp.path());

        let id1 = store.append("chat", message("one", 1)).await.unwrap();
        let id2 = store.append("chat", message("two", 2)).await.unwrap();

        let all = store.read_all("chat").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, id1);
        assert_eq!(all[1].id, id2);
        assert!(all.iter().all(|m| m.server_time.is_some()));
    }

    #[tokio::test]
    async fn test_read_missing_session_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = JsonlMessageStore::new(temp.path());
        assert!(store.read_all("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_rewrites_log() {
        let temp = TempDir::new().unwrap();
        let store = JsonlMessageStore::new(temp.path());

        let keep = store.append("chat", message("keep", 1)).await.unwrap();
        let drop = store.append("chat", message("drop", 2)).await.unwrap();

        store.delete_all("chat", &[drop]).await.unwrap();

        let all = store.read_all("chat").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, keep);
    }

    #[tokio::test]
    async fn test_delete_all_with_unknown_id_changes_nothing() {
        let temp = TempDir::new().unwrap();
        let store = JsonlMessageStore::new(temp.path());

        let id = store.append("chat", message("one", 1)).await.unwrap();
        let result = store.delete_all("chat", &[id, "ghost".to_string()]).await;

        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(store.read_all("chat").await.unwrap().len(), 1);
    }

    #[test]
    fn test_diff_snapshot() {
        let mut a = message("a", 1);
        a.id = "a".into();
        let mut b = message("b", 2);
        b.id = "b".into();

        let mut known = HashMap::new();
        let first = diff_snapshot(&mut known, vec![a.clone(), b.clone()]);
        assert_eq!(first.added().count(), 2);

        let second = diff_snapshot(&mut known, vec![a.clone(), b.clone()]);
        assert!(second.is_empty());

        let mut b2 = b.clone();
        b2.text = "b edited".into();
        let third = diff_snapshot(&mut known, vec![b2]);
        let kinds: Vec<ChangeKind> = third.changes.iter().map(|c| c.kind).collect();
        assert!(kinds.contains(&ChangeKind::Modified));
        assert!(kinds.contains(&ChangeKind::Removed));
        assert_eq!(third.snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_subscription_sees_local_writes() {
        let temp = TempDir::new().unwrap();
        let store = JsonlMessageStore::new(temp.path());
        store.append("chat", message("before", 1)).await.unwrap();

        let mut rx = store.subscribe("chat").await.unwrap();
        let initial = rx.recv().await.unwrap().unwrap();
        assert_eq!(initial.snapshot.len(), 1);

        store.append("chat", message("after", 2)).await.unwrap();
        let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(batch.added().count(), 1);
        assert_eq!(batch.snapshot.len(), 2);
    }
}
