//! Realtime synchronization between the shared log and a role view.
//!
//! A subscription turns store change batches into an ordered message list
//! for one role, and decides when the arrival of peer content deserves a
//! notification:
//!
//! - The first batch is the existing history and never notifies.
//! - Afterwards, a batch notifies once if any added record was authored by
//!   someone other than the local identity.
//! - Batches are processed strictly in delivery order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{ChangeBatch, Message, Role, SessionError};
use crate::notification::{MuteFlag, NotificationEmitter};
use crate::store::MessageStore;

/// Per-subscription view state
#[derive(Debug, Clone)]
pub struct SyncState {
    role: Role,
    identity: String,

    /// Set after the first batch and never cleared
    completed_first_snapshot: bool,

    /// Newest peer message seen so far
    last_seen_inbound: Option<String>,

    /// Ordered view for `role`
    messages: Vec<Message>,
}

/// Result of applying one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rebuilt ordered view
    pub messages: Vec<Message>,

    /// The batch carried new peer content (regardless of mute)
    pub new_peer_content: bool,

    /// A notification should fire for this batch
    pub notify: bool,
}

impl SyncState {
    pub fn new(role: Role, identity: impl Into<String>) -> Self {
        Self {
            role,
            identity: identity.into(),
            completed_first_snapshot: false,
            last_seen_inbound: None,
            messages: Vec::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn completed_first_snapshot(&self) -> bool {
        self.completed_first_snapshot
    }

    pub fn last_seen_inbound(&self) -> Option<&str> {
        self.last_seen_inbound.as_deref()
    }

    /// Ordered view after the last applied batch
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Apply one change batch
    pub fn apply(&mut self, batch: &ChangeBatch, muted: bool) -> BatchOutcome {
        let mut messages = batch.snapshot.clone();
        self.role.project(&mut messages);

        let is_initial = !self.completed_first_snapshot;
        let mut new_peer_content = false;
        let mut newest_peer: Option<&Message> = None;

        // Inspect every added record before deciding
        for record in batch.added() {
            if record.is_from(&self.identity) {
                continue;
            }

            if newest_peer.map_or(true, |n| Message::chronological(record, n).is_gt()) {
                newest_peer = Some(record);
            }

            if !is_initial && self.last_seen_inbound.as_deref() != Some(record.id.as_str()) {
                new_peer_content = true;
            }
        }

        if let Some(peer) = newest_peer {
            self.last_seen_inbound = Some(peer.id.clone());
        }

        self.completed_first_snapshot = true;
        self.messages = messages.clone();

        BatchOutcome {
            messages,
            new_peer_content,
            notify: new_peer_content && !muted,
        }
    }
}

/// Subscribes role views to a session's message log
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn MessageStore>,
    identity: String,
    role: Role,
    emitter: NotificationEmitter,
    mute: MuteFlag,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn MessageStore>,
        identity: impl Into<String>,
        role: Role,
        emitter: NotificationEmitter,
        mute: MuteFlag,
    ) -> Self {
        Self {
            store,
            identity: identity.into(),
            role,
            emitter,
            mute,
        }
    }

    /// Start delivering ordered views of `session`.
    ///
    /// `on_update` receives the rebuilt ordered list after every batch;
    /// `on_error` receives classified store failures. A failure to subscribe
    /// at all is reported through `on_error` and yields a finished handle.
    pub async fn subscribe<U, E>(
        &self,
        session: &str,
        mut on_update: U,
        mut on_error: E,
    ) -> SubscriptionHandle
    where
        U: FnMut(Vec<Message>) + Send + 'static,
        E: FnMut(SessionError) + Send + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));

        let mut stream = match self.store.subscribe(session).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(session, error = %e, "Subscribe failed");
                active.store(false, Ordering::SeqCst);
                on_error(e.into_session("subscribe"));
                return SubscriptionHandle { active, task: None };
            }
        };

        info!(session, role = %self.role, "Subscribed to session");

        let mut state = SyncState::new(self.role, self.identity.clone());
        let emitter = self.emitter.clone();
        let mute = self.mute.clone();
        let flag = active.clone();
        let session = session.to_string();

        let task = tokio::spawn(async move {
            while let Some(item) = stream.recv().await {
                if !flag.load(Ordering::SeqCst) {
                    break;
                }

                match item {
                    Ok(batch) => {
                        let outcome = state.apply(&batch, mute.is_muted());
                        debug!(
                            session = %session,
                            changes = batch.changes.len(),
                            total = outcome.messages.len(),
                            notify = outcome.notify,
                            "Applied change batch"
                        );
                        if outcome.notify {
                            emitter.notify();
                        }
                        on_update(outcome.messages);
                    }
                    Err(e) => {
                        let terminal = e.is_terminal();
                        warn!(session = %session, error = %e, terminal, "Store reported an error");
                        on_error(e.into_session("subscribe"));
                        if terminal {
                            break;
                        }
                    }
                }
            }

            flag.store(false, Ordering::SeqCst);
            debug!(session = %session, "Subscription ended");
        });

        SubscriptionHandle {
            active,
            task: Some(task),
        }
    }
}

/// Handle to stop a subscription; dropping it also stops it
pub struct SubscriptionHandle {
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Stop classifying batches. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Whether batches are still being processed
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
