//! Message records shared by both roles of a session.
//!
//! A message is immutable once appended. The author is a snapshot of the
//! producing participant taken at send time and is never refreshed.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single message in the shared session log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Store-assigned identifier (empty until appended)
    #[serde(default)]
    pub id: String,

    /// Message body; an emoji glyph for `emoji` messages
    pub text: String,

    /// Conversational side that produced the message
    pub role: Role,

    /// Rendering hint
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Author snapshot taken at send time
    pub author: Author,

    /// Authoritative store timestamp (None until committed)
    #[serde(default)]
    pub server_time: Option<DateTime<Utc>>,

    /// Client-assigned milliseconds, used for ordering
    pub local_time: u64,
}

impl Message {
    /// Create an unsent message; the store assigns `id` and `server_time`
    pub fn new(
        text: impl Into<String>,
        role: Role,
        kind: MessageKind,
        author: Author,
        local_time: u64,
    ) -> Self {
        Self {
            id: String::new(),
            text: text.into(),
            role,
            kind,
            author,
            server_time: None,
            local_time,
        }
    }

    /// Whether this message was produced by the given identity
    pub fn is_from(&self, identity: &str) -> bool {
        self.author.identity == identity
    }

    /// Chronological order: `local_time`, then `id` to break ties
    pub fn chronological(a: &Message, b: &Message) -> Ordering {
        a.local_time
            .cmp(&b.local_time)
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Which side of the conversation a message or view belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Dictates or types messages
    Sender,

    /// Reads the latest message and replies
    Receiver,
}

impl Role {
    /// Default display name used when the profile has none
    pub fn default_display_name(self) -> &'static str {
        match self {
            Role::Sender => "Sender",
            Role::Receiver => "Receiver",
        }
    }

    /// Order a snapshot the way this role displays it.
    ///
    /// Senders read chronologically, receivers most-recent-first.
    pub fn project(self, messages: &mut [Message]) {
        match self {
            Role::Sender => messages.sort_by(Message::chronological),
            Role::Receiver => messages.sort_by(|a, b| Message::chronological(b, a)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Sender => write!(f, "sender"),
            Role::Receiver => write!(f, "receiver"),
        }
    }
}

/// Rendering kind of a message; does not affect ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Free text
    Text,

    /// A single emoji glyph
    Emoji,

    /// A canned or AI-suggested reply
    Preset,
}

impl Default for MessageKind {
    fn default() -> Self {
        Self::Text
    }
}

/// Denormalized author snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub identity: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
}

impl Author {
    pub fn new(identity: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            display_name: display_name.into(),
            avatar_ref: None,
        }
    }

    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }

    /// First character of the display name, for avatar placeholders
    pub fn initial(&self) -> Option<char> {
        self.display_name.chars().next()
    }
}

/// Strictly increasing millisecond clock for `local_time`.
///
/// Wall-clock time is used while it moves forward; when two reads land in
/// the same millisecond (or the clock steps back) the previous value + 1 is
/// returned instead.
#[derive(Debug, Default)]
pub struct LocalClock {
    last: AtomicU64,
}

impl LocalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp, always greater than the previous one
    pub fn next(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut prev = self.last.load(AtomicOrdering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self.last.compare_exchange_weak(
                prev,
                candidate,
                AtomicOrdering::Relaxed,
                AtomicOrdering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, local_time: u64) -> Message {
        let mut msg = Message::new(
            "hello",
            Role::Sender,
            MessageKind::Text,
            Author::new("u1", "Alice"),
            local_time,
        );
        msg.id = id.to_string();
        msg
    }

    #[test]
    fn test_wire_field_names() {
        let msg = message("m1", 42);
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "text");
        assert_eq!(json["role"], "sender");
        assert_eq!(json["localTime"], 42);
        assert!(json["serverTime"].is_null());
        assert_eq!(json["author"]["displayName"], "Alice");
    }

    #[test]
    fn test_role_projection() {
        let mut msgs = vec![message("a", 100), message("b", 300), message("c", 200)];

        Role::Sender.project(&mut msgs);
        let times: Vec<u64> = msgs.iter().map(|m| m.local_time).collect();
        assert_eq!(times, vec![100, 200, 300]);

        Role::Receiver.project(&mut msgs);
        let times: Vec<u64> = msgs.iter().map(|m| m.local_time).collect();
        assert_eq!(times, vec![300, 200, 100]);
    }

    #[test]
    fn test_projection_tolerates_collisions() {
        let mut msgs = vec![message("b", 100), message("a", 100)];
        Role::Sender.project(&mut msgs);
        assert_eq!(msgs[0].id, "a");

        Role::Receiver.project(&mut msgs);
        assert_eq!(msgs[0].id, "b");
    }

    #[test]
    fn test_local_clock_strictly_increases() {
        let clock = LocalClock::new();
        let mut prev = clock.next();
        for _ in 0..1000 {
            let next = clock.next();
            assert!(next > prev);
            prev = next;
        }
    }
}
