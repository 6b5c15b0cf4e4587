//! Receiver-side reply state: latest inbound message and AI suggestions.
//!
//! Suggestions belong to exactly one inbound message. When a newer inbound
//! arrives the old suggestions are dropped, and a generation started for an
//! older message is discarded when it completes.

use tracing::debug;

use crate::assist::AssistService;
use crate::domain::{Message, Role};

/// Most recent sender-role message, independent of how `messages` is ordered
pub fn derive_latest_inbound(messages: &[Message]) -> Option<&Message> {
    messages
        .iter()
        .filter(|m| m.role == Role::Sender)
        .max_by(|a, b| Message::chronological(a, b))
}

/// An in-flight suggestion generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionTicket {
    pub message_id: String,
    pub text: String,
}

#[derive(Debug, Default, Clone)]
pub struct ReplyPipeline {
    latest_inbound: Option<Message>,
    suggestions: Vec<String>,
    in_flight: Option<String>,
}

impl ReplyPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest_inbound(&self) -> Option<&Message> {
        self.latest_inbound.as_ref()
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn is_generating(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Re-derive the latest inbound from an ordered view.
    ///
    /// Returns true when the latest inbound changed, in which case existing
    /// suggestions were dropped.
    pub fn update(&mut self, messages: &[Message]) -> bool {
        let latest = derive_latest_inbound(messages);
        let current_id = self.latest_inbound.as_ref().map(|m| m.id.as_str());

        if latest.map(|m| m.id.as_str()) == current_id {
            return false;
        }

        debug!(
            from = ?current_id,
            to = ?latest.map(|m| m.id.as_str()),
            "Latest inbound changed"
        );
        self.latest_inbound = latest.cloned();
        self.suggestions.clear();
        self.in_flight = None;
        true
    }

    /// Claim the right to generate suggestions for the current inbound.
    ///
    /// None when there is no inbound, suggestions already exist, or a
    /// generation is already running.
    pub fn begin_suggestions(&mut self) -> Option<SuggestionTicket> {
        if !self.suggestions.is_empty() || self.in_flight.is_some() {
            return None;
        }

        let inbound = self.latest_inbound.as_ref()?;
        self.in_flight = Some(inbound.id.clone());

        Some(SuggestionTicket {
            message_id: inbound.id.clone(),
            text: inbound.text.clone(),
        })
    }

    /// Store the result of a generation.
    ///
    /// Returns false when the result was discarded because the latest
    /// inbound changed while it was running.
    pub fn complete_suggestions(&mut self, ticket: &SuggestionTicket, replies: Vec<String>) -> bool {
        if self.in_flight.as_deref() == Some(ticket.message_id.as_str()) {
            self.in_flight = None;
        }

        let current = self.latest_inbound.as_ref().map(|m| m.id.as_str());
        if current != Some(ticket.message_id.as_str()) {
            debug!(message_id = %ticket.message_id, "Discarding stale suggestions");
            return false;
        }

        self.suggestions = replies;
        true
    }

    /// Generate suggestions for the current inbound if none exist yet
    pub async fn generate(&mut self, assist: &AssistService) -> &[String] {
        if let Some(ticket) = self.begin_suggestions() {
            let replies = assist.suggest_replies(&ticket.text).await;
            self.complete_suggestions(&ticket, replies);
        }
        &self.suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Author, MessageKind};

    fn msg(id: &str, role: Role, local_time: u64) -> Message {
        let mut m = Message::new(
            format!("text {}", id),
            role,
            MessageKind::Text,
            Author::new("someone", "Someone"),
            local_time,
        );
        m.id = id.to_string();
        m
    }

    #[test]
    fn test_latest_inbound_ignores_order_and_receiver_messages() {
        let mut view = vec![
            msg("s1", Role::Sender, 100),
            msg("r1", Role::Receiver, 400),
            msg("s2", Role::Sender, 300),
        ];
        assert_eq!(derive_latest_inbound(&view).unwrap().id, "s2");

        Role::Receiver.project(&mut view);
        assert_eq!(derive_latest_inbound(&view).unwrap().id, "s2");

        assert!(derive_latest_inbound(&[msg("r1", Role::Receiver, 1)]).is_none());
    }

    #[test]
    fn test_begin_is_gated() {
        let mut pipeline = ReplyPipeline::new();
        assert!(pipeline.begin_suggestions().is_none());

        pipeline.update(&[msg("s1", Role::Sender, 1)]);
        let ticket = pipeline.begin_suggestions().unwrap();
        assert_eq!(ticket.message_id, "s1");
        assert!(pipeline.begin_suggestions().is_none());

        assert!(pipeline.complete_suggestions(&ticket, vec!["OK".to_string()]));
        assert!(pipeline.begin_suggestions().is_none());
        assert_eq!(pipeline.suggestions(), ["OK".to_string()]);
    }

    #[test]
    fn test_empty_result_allows_retry() {
        let mut pipeline = ReplyPipeline::new();
        pipeline.update(&[msg("s1", Role::Sender, 1)]);

        let ticket = pipeline.begin_suggestions().unwrap();
        pipeline.complete_suggestions(&ticket, Vec::new());
        assert!(pipeline.begin_suggestions().is_some());
    }

    #[test]
    fn test_new_inbound_clears_and_discards_stale() {
        let mut pipeline = ReplyPipeline::new();
        pipeline.update(&[msg("s1", Role::Sender, 1)]);
        let stale = pipeline.begin_suggestions().unwrap();

        assert!(pipeline.update(&[msg("s1", Role::Sender, 1), msg("s2", Role::Sender, 2)]));
        assert!(!pipeline.is_generating());

        assert!(!pipeline.complete_suggestions(&stale, vec!["late".to_string()]));
        assert!(pipeline.suggestions().is_empty());
        assert_eq!(pipeline.begin_suggestions().unwrap().message_id, "s2");
    }

    #[test]
    fn test_unchanged_inbound_keeps_suggestions() {
        let mut pipeline = ReplyPipeline::new();
        let view = vec![msg("s1", Role::Sender, 1)];
        pipeline.update(&view);
        let ticket = pipeline.begin_suggestions().unwrap();
        pipeline.complete_suggestions(&ticket, vec!["Sure".to_string()]);

        let mut with_reply = view.clone();
        with_reply.push(msg("r1", Role::Receiver, 2));
        assert!(!pipeline.update(&with_reply));
        assert_eq!(pipeline.suggestions().len(), 1);
    }
}
