//! In-process message store.
//!
//! Holds each session's log in memory and pushes precise change batches to
//! subscribers. Access can be revoked per session to exercise the error
//! paths of subscribers.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{validate_session_name, BatchStream, MessageStore, StoreError};
use crate::domain::{Change, ChangeBatch, Message};

type Subscriber = mpsc::UnboundedSender<Result<ChangeBatch, StoreError>>;

#[derive(Default)]
struct SessionLog {
    messages: Vec<Message>,
    subscribers: Vec<Subscriber>,
    denied: Option<String>,
}

impl SessionLog {
    fn check_access(&self) -> Result<(), StoreError> {
        match &self.denied {
            Some(reason) => Err(StoreError::AccessDenied(reason.clone())),
            None => Ok(()),
        }
    }

    fn broadcast(&mut self, changes: Vec<Change>) {
        let batch = ChangeBatch {
            changes,
            snapshot: self.messages.clone(),
        };
        self.subscribers
            .retain(|tx| tx.send(Ok(batch.clone())).is_ok());
    }
}

/// Message store kept entirely in memory
#[derive(Default)]
pub struct MemoryMessageStore {
    sessions: Mutex<HashMap<String, SessionLog>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, SessionLog>>, StoreError> {
        self.sessions
            .lock()
            .map_err(|_| StoreError::Unavailable("session map lock poisoned".to_string()))
    }

    /// Revoke access to a session.
    ///
    /// Live subscriptions receive a terminal `AccessDenied` and are closed;
    /// later operations fail until `restore_access` is called.
    pub fn revoke_access(&self, session: &str, reason: &str) -> Result<(), StoreError> {
        let mut sessions = self.lock()?;
        let log = sessions.entry(session.to_string()).or_default();
        log.denied = Some(reason.to_string());
        for tx in log.subscribers.drain(..) {
            let _ = tx.send(Err(StoreError::AccessDenied(reason.to_string())));
        }
        Ok(())
    }

    pub fn restore_access(&self, session: &str) -> Result<(), StoreError> {
        let mut sessions = self.lock()?;
        if let Some(log) = sessions.get_mut(session) {
            log.denied = None;
        }
        Ok(())
    }

    /// Report a transient outage to subscribers without closing them
    pub fn report_unavailable(&self, session: &str, reason: &str) -> Result<(), StoreError> {
        let mut sessions = self.lock()?;
        if let Some(log) = sessions.get_mut(session) {
            log.subscribers.retain(|tx| {
                tx.send(Err(StoreError::Unavailable(reason.to_string())))
                    .is_ok()
            });
        }
        Ok(())
    }

    /// Number of live subscriptions on a session
    pub fn subscriber_count(&self, session: &str) -> usize {
        self.lock()
            .ok()
            .and_then(|mut sessions| {
                sessions.get_mut(session).map(|log| {
                    log.subscribers.retain(|tx| !tx.is_closed());
                    log.subscribers.len()
                })
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, session: &str, mut message: Message) -> Result<String, StoreError> {
        validate_session_name(session)?;
        let mut sessions = self.lock()?;
        let log = sessions.entry(session.to_string()).or_default();
        log.check_access()?;

        message.id = Uuid::new_v4().to_string();
        message.server_time = Some(Utc::now());
        let id = message.id.clone();

        log.messages.push(message.clone());
        log.broadcast(vec![Change::added(message)]);

        Ok(id)
    }

    async fn read_all(&self, session: &str) -> Result<Vec<Message>, StoreError> {
        validate_session_name(session)?;
        let sessions = self.lock()?;
        match sessions.get(session) {
            Some(log) => {
                log.check_access()?;
                Ok(log.messages.clone())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn subscribe(&self, session: &str) -> Result<BatchStream, StoreError> {
        validate_session_name(session)?;
        let mut sessions = self.lock()?;
        let log = sessions.entry(session.to_string()).or_default();
        log.check_access()?;

        let (tx, rx) = mpsc::unbounded_channel();
        // Cannot fail: the receiver is still held here
        let _ = tx.send(Ok(ChangeBatch::initial(log.messages.clone())));
        log.subscribers.push(tx);

        Ok(rx)
    }

    async fn delete_all(&self, session: &str, ids: &[String]) -> Result<(), StoreError> {
        validate_session_name(session)?;
        let mut sessions = self.lock()?;
        let log = sessions.entry(session.to_string()).or_default();
        log.check_access()?;

        let present: HashSet<&str> = log.messages.iter().map(|m| m.id.as_str()).collect();
        if let Some(missing) = ids.iter().find(|id| !present.contains(id.as_str())) {
            return Err(StoreError::NotFound(missing.clone()));
        }

        let doomed: HashSet<&String> = ids.iter().collect();
        let (removed, kept): (Vec<Message>, Vec<Message>) = log
            .messages
            .drain(..)
            .partition(|m| doomed.contains(&m.id));
        log.messages = kept;

        if !removed.is_empty() {
            log.broadcast(removed.into_iter().map(Change::removed).collect());
        }

        Ok(())
    }
}
