//! Message store interface.
//!
//! The store is the shared, append-only, timestamp-ordered log both roles
//! read from. It assigns ids and server timestamps, delivers realtime change
//! batches, and supports an all-or-nothing bulk delete.
//!
//! Two implementations ship with the crate:
//! - `MemoryMessageStore`: in-process, used by tests and embedding callers
//! - `JsonlMessageStore`: a JSONL log on disk shared between processes

pub mod jsonl;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::{ChangeBatch, Message, SessionError};

pub use jsonl::JsonlMessageStore;
pub use memory::MemoryMessageStore;

/// Stream of change batches for one subscription.
///
/// Batches arrive in delivery order. A terminal error is followed by the
/// stream closing.
pub type BatchStream = mpsc::UnboundedReceiver<Result<ChangeBatch, StoreError>>;

/// Errors reported by a message store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Invalid session name: {0}")]
    InvalidSession(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the store ends the subscription after this error
    pub fn is_terminal(&self) -> bool {
        matches!(self, StoreError::AccessDenied(_) | StoreError::InvalidSession(_))
    }

    /// Classify for delivery to a role view
    pub fn into_session(self, operation: &'static str) -> SessionError {
        let terminal = self.is_terminal();
        SessionError::Transport {
            operation,
            reason: self.to_string(),
            terminal,
        }
    }
}

/// Shared message log used by both roles
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message, returning its store-assigned id
    async fn append(&self, session: &str, message: Message) -> Result<String, StoreError>;

    /// Read every message currently in the log
    async fn read_all(&self, session: &str) -> Result<Vec<Message>, StoreError>;

    /// Subscribe to change batches; the first batch is the full snapshot
    async fn subscribe(&self, session: &str) -> Result<BatchStream, StoreError>;

    /// Delete the given messages atomically (all or nothing)
    async fn delete_all(&self, session: &str, ids: &[String]) -> Result<(), StoreError>;
}

/// Session names become directory names, so keep them to a safe alphabet
pub fn validate_session_name(session: &str) -> Result<(), StoreError> {
    let valid = !session.is_empty()
        && session
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && session != "."
        && session != "..";

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidSession(session.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorClass;

    #[test]
    fn test_session_name_validation() {
        assert!(validate_session_name("live_transcription_chat").is_ok());
        assert!(validate_session_name("room-2.v3").is_ok());
        assert!(validate_session_name("").is_err());
        assert!(validate_session_name("..").is_err());
        assert!(validate_session_name("a/b").is_err());
    }

    #[test]
    fn test_store_error_classification() {
        let err = StoreError::AccessDenied("rules".into()).into_session("subscribe");
        assert_eq!(err.class(), ErrorClass::Transport);
        assert!(err.is_terminal());

        let err = StoreError::Unavailable("offline".into()).into_session("append");
        assert!(!err.is_terminal());
    }
}
