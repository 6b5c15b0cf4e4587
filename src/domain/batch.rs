//! Change batches delivered by a message store subscription.

use serde::{Deserialize, Serialize};

use super::message::Message;

/// What happened to a record within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One record change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub message: Message,
}

impl Change {
    pub fn added(message: Message) -> Self {
        Self {
            kind: ChangeKind::Added,
            message,
        }
    }

    pub fn modified(message: Message) -> Self {
        Self {
            kind: ChangeKind::Modified,
            message,
        }
    }

    pub fn removed(message: Message) -> Self {
        Self {
            kind: ChangeKind::Removed,
            message,
        }
    }
}

/// A realtime notification from the store.
///
/// `snapshot` is the full set of records visible after the changes were
/// applied, in no particular order. The first batch of a subscription lists
/// every existing record as `Added`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub changes: Vec<Change>,
    pub snapshot: Vec<Message>,
}

impl ChangeBatch {
    /// Initial batch: every record is reported as added
    pub fn initial(snapshot: Vec<Message>) -> Self {
        let changes = snapshot.iter().cloned().map(Change::added).collect();
        Self { changes, snapshot }
    }

    /// Records added in this batch
    pub fn added(&self) -> impl Iterator<Item = &Message> {
        self.changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Added)
            .map(|c| &c.message)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
