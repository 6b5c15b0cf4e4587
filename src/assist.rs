//! Refine and suggest operations on top of a completion adapter.
//!
//! Both operations are best-effort: every failure collapses to a fallback
//! value (the original draft, or no suggestions) and is only logged.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::adapters::Adapter;
use crate::domain::SessionError;

/// Maximum number of reply suggestions kept
pub const MAX_SUGGESTIONS: usize = 3;

const REFINE_INSTRUCTION: &str = "Rewrite the following text as a natural, polite chat \
message. Fix typos and transcription mistakes and keep the original meaning. \
Output only the rewritten text.";

const SUGGEST_INSTRUCTION: &str = "Generate three short, appropriate reply candidates to \
the received message. Output only a JSON array of strings \
(for example [\"candidate 1\", \"candidate 2\", \"candidate 3\"]) with no explanation.";

/// Why an assist call fell back
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssistError {
    #[error("Completion failed: {0}")]
    Completion(String),

    #[error("Completion was empty")]
    Empty,

    #[error("No JSON array in response")]
    NoArray,

    #[error("Response is not an array of strings: {0}")]
    NotStringArray(String),
}

impl From<AssistError> for SessionError {
    fn from(err: AssistError) -> Self {
        match err {
            AssistError::Completion(_) | AssistError::Empty => {
                SessionError::AssistDegraded(err.to_string())
            }
            AssistError::NoArray | AssistError::NotStringArray(_) => {
                SessionError::Parse(err.to_string())
            }
        }
    }
}

/// Generative assist for drafts and replies
#[derive(Clone)]
pub struct AssistService {
    adapter: Arc<dyn Adapter>,
    timeout: Duration,
}

impl AssistService {
    pub fn new(adapter: Arc<dyn Adapter>, timeout: Duration) -> Self {
        Self { adapter, timeout }
    }

    /// Prompt sent for `refine`
    pub fn refine_prompt(draft: &str) -> String {
        format!("{}\n\nText: {}", REFINE_INSTRUCTION, draft)
    }

    /// Prompt sent for `suggest_replies`
    pub fn suggest_prompt(inbound: &str) -> String {
        format!("{}\n\nReceived message: \"{}\"", SUGGEST_INSTRUCTION, inbound)
    }

    async fn complete(&self, prompt: &str) -> Result<String, AssistError> {
        let output = self
            .adapter
            .complete(prompt, self.timeout)
            .await
            .map_err(|e| AssistError::Completion(format!("{:#}", e)))?;

        let text = output.content.trim();
        if text.is_empty() {
            return Err(AssistError::Empty);
        }
        Ok(text.to_string())
    }

    /// Polish a draft; returns the draft unchanged on any failure.
    ///
    /// Empty or whitespace-only drafts are returned as-is without a call.
    pub async fn refine(&self, draft: &str) -> String {
        if draft.trim().is_empty() {
            return draft.to_string();
        }

        match self.complete(&Self::refine_prompt(draft)).await {
            Ok(polished) => polished,
            Err(e) => {
                warn!(adapter = self.adapter.name(), error = %e, "Refine degraded, keeping draft");
                draft.to_string()
            }
        }
    }

    /// Up to three reply suggestions for an inbound message; empty on failure
    pub async fn suggest_replies(&self, inbound: &str) -> Vec<String> {
        if inbound.trim().is_empty() {
            return Vec::new();
        }

        let result = match self.complete(&Self::suggest_prompt(inbound)).await {
            Ok(raw) => parse_suggestions(&raw),
            Err(e) => Err(e),
        };

        match result {
            Ok(replies) => {
                debug!(count = replies.len(), "Generated reply suggestions");
                replies
            }
            Err(e) => {
                let class = SessionError::from(e).class();
                warn!(adapter = self.adapter.name(), ?class, "Suggestions degraded");
                Vec::new()
            }
        }
    }
}

/// Slice from the first `[` to the last `]`, if both exist in that order
pub fn extract_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (end > start).then(|| &raw[start..=end])
}

/// Extract and parse the suggestion array from a raw completion.
///
/// String elements are trimmed and blanks dropped; the result is capped at
/// `MAX_SUGGESTIONS`. Any non-string element rejects the whole response.
pub fn parse_suggestions(raw: &str) -> Result<Vec<String>, AssistError> {
    let array = extract_array(raw).ok_or(AssistError::NoArray)?;

    let values: Vec<serde_json::Value> = serde_json::from_str(array)
        .map_err(|e| AssistError::NotStringArray(e.to_string()))?;

    let mut replies = Vec::with_capacity(values.len());
    for value in values {
        match value {
            serde_json::Value::String(s) => {
                let s = s.trim();
                if !s.is_empty() {
                    replies.push(s.to_string());
                }
            }
            other => return Err(AssistError::NotStringArray(other.to_string())),
        }
    }

    replies.truncate(MAX_SUGGESTIONS);
    Ok(replies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_surrounding_prose() {
        let replies = parse_suggestions(r#"Sure! ["OK", "Got it", "Noted"] thanks"#).unwrap();
        assert_eq!(replies, vec!["OK", "Got it", "Noted"]);
    }

    #[test]
    fn test_parse_without_brackets() {
        assert_eq!(parse_suggestions("no brackets here"), Err(AssistError::NoArray));
    }

    #[test]
    fn test_parse_caps_at_three() {
        let replies = parse_suggestions(r#"["a","b","c","d"]"#).unwrap();
        assert_eq!(replies.len(), 3);
    }

    #[test]
    fn test_parse_multiline_fenced_block() {
        let raw = "```json\n[\n  \"Sounds good\",\n  \"See you\"\n]\n```";
        assert_eq!(parse_suggestions(raw).unwrap(), vec!["Sounds good", "See you"]);
    }

    #[test]
    fn test_parse_rejects_non_strings() {
        assert!(matches!(
            parse_suggestions("[1, 2]"),
            Err(AssistError::NotStringArray(_))
        ));
        assert!(matches!(
            parse_suggestions("[not json]"),
            Err(AssistError::NotStringArray(_))
        ));
    }

    #[test]
    fn test_extract_array_order() {
        assert_eq!(extract_array("] before ["), None);
        assert_eq!(extract_array("x [1] y [2] z"), Some("[1] y [2]"));
    }

    #[test]
    fn test_error_classes() {
        use crate::domain::ErrorClass;
        assert_eq!(SessionError::from(AssistError::Empty).class(), ErrorClass::AssistDegraded);
        assert_eq!(SessionError::from(AssistError::NoArray).class(), ErrorClass::Parse);
    }
}
