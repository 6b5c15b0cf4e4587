//! Domain types for voicelink.
//!
//! This module contains the core data structures:
//! - Message: Immutable records in the shared session log
//! - ChangeBatch: Realtime notifications from the store
//! - SessionError: The error taxonomy surfaced to role views

pub mod batch;
pub mod error;
pub mod message;

// Re-export commonly used types
pub use batch::{Change, ChangeBatch, ChangeKind};
pub use error::{Capability, ErrorClass, SessionError};
pub use message::{Author, LocalClock, Message, MessageKind, Role};
