//! Session-level error taxonomy.
//!
//! Every failure surfaced to a role view carries one of four stable
//! classes. Capability-local failures (capture, assist) degrade; store
//! failures are surfaced without tearing the view down.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error classification shown to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Store subscribe/append/delete failure (banner, non-fatal)
    Transport,

    /// Capability permission denied (terminal until re-granted)
    Permission,

    /// Assist call failed or returned nothing usable
    AssistDegraded,

    /// Assist response was not the expected structured data
    Parse,
}

/// Capability a permission error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Microphone,
    SignIn,
    Store,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Microphone => write!(f, "microphone"),
            Capability::SignIn => write!(f, "sign-in"),
            Capability::Store => write!(f, "message store"),
        }
    }
}

/// Error delivered to a role view
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Message store {operation} failed: {reason}")]
    Transport {
        operation: &'static str,
        reason: String,
        /// The store ended the subscription
        terminal: bool,
    },

    #[error("Permission denied for {capability}")]
    Permission { capability: Capability },

    #[error("Assist unavailable: {0}")]
    AssistDegraded(String),

    #[error("Assist response could not be parsed: {0}")]
    Parse(String),
}

impl SessionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SessionError::Transport { .. } => ErrorClass::Transport,
            SessionError::Permission { .. } => ErrorClass::Permission,
            SessionError::AssistDegraded(_) => ErrorClass::AssistDegraded,
            SessionError::Parse(_) => ErrorClass::Parse,
        }
    }

    /// Whether the failing capability stays unusable until the user acts
    pub fn is_terminal(&self) -> bool {
        match self {
            SessionError::Transport { terminal, .. } => *terminal,
            SessionError::Permission { .. } => true,
            SessionError::AssistDegraded(_) | SessionError::Parse(_) => false,
        }
    }

    /// Whether the UI should block on this error rather than show a banner
    pub fn is_blocking(&self) -> bool {
        matches!(self, SessionError::Permission { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let transport = SessionError::Transport {
            operation: "subscribe",
            reason: "access denied".to_string(),
            terminal: true,
        };
        assert_eq!(transport.class(), ErrorClass::Transport);
        assert!(transport.is_terminal());
        assert!(!transport.is_blocking());

        let permission = SessionError::Permission {
            capability: Capability::Microphone,
        };
        assert_eq!(permission.class(), ErrorClass::Permission);
        assert!(permission.is_blocking());
        assert_eq!(permission.to_string(), "Permission denied for microphone");

        assert_eq!(
            SessionError::Parse("no array".into()).class(),
            ErrorClass::Parse
        );
        assert!(!SessionError::AssistDegraded("timeout".into()).is_terminal());
    }
}
