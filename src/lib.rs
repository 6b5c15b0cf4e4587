//! voicelink - Two-role live messaging with dictation and AI assist
//!
//! A sender dictates or types messages into a shared session log; a
//! receiver follows the log live and answers with free text, presets,
//! emoji or AI-suggested replies.
//!
//! # Architecture
//!
//! The system is built around a shared append-only log:
//! - Messages are immutable and carry a snapshot of their author
//! - Each role view is rebuilt from store change batches
//! - Optional enhancements (assist, notifications, capture) degrade
//!   without affecting message flow
//!
//! # Modules
//!
//! - `store`: Shared message log (in-memory and JSONL on disk)
//! - `core`: Sync engine, reply pipeline and role views
//! - `speech`: Continuous dictation over session-based recognizers
//! - `assist`: Refine and suggest operations
//! - `adapters`: Completion backends (Gemini, local command)
//! - `notification`: Tone and haptic cues
//! - `domain`: Data structures (Message, ChangeBatch, SessionError)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Receiver: follow the session and reply interactively
//! voicelink watch --role receiver
//!
//! # Sender: dictate from a speech-to-text pipe
//! my-stt | voicelink dictate --refine
//! ```

pub mod adapters;
pub mod assist;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod notification;
pub mod speech;
pub mod store;

// Re-export main types at crate root for convenience
pub use assist::AssistService;
pub use self::core::{ReplyPipeline, SessionView, SyncEngine};
pub use domain::{Author, ErrorClass, Message, MessageKind, Role, SessionError};
pub use notification::{MuteFlag, NotificationEmitter};
pub use speech::{CaptureState, SpeechCaptureEngine};
pub use store::{JsonlMessageStore, MemoryMessageStore, MessageStore};
