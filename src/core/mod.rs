//! Core session logic.
//!
//! This module contains:
//! - Sync: store batches to ordered role views, notification decisions
//! - Replies: latest inbound message and suggestion lifecycle
//! - Session: a role's live view tying the pieces together

pub mod replies;
pub mod session;
pub mod sync;

// Re-export commonly used types
pub use replies::{derive_latest_inbound, ReplyPipeline, SuggestionTicket};
pub use session::{SendError, SessionView, ViewEvent};
pub use sync::{BatchOutcome, SubscriptionHandle, SyncEngine, SyncState};
