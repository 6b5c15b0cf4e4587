//! A role's live view of one session.
//!
//! Ties the sync engine, the reply pipeline and the assist service to a
//! local profile. Store failures never tear the view down: the last good
//! message list stays available and the error is kept for display.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, instrument};

use crate::assist::AssistService;
use crate::config::profile::Profile;
use crate::config::ReplySettings;
use crate::domain::{LocalClock, Message, MessageKind, Role, SessionError};
use crate::notification::{MuteFlag, NotificationEmitter};
use crate::store::MessageStore;

use super::replies::ReplyPipeline;
use super::sync::{SubscriptionHandle, SyncEngine};

/// Something a mounted view wants to show
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// New ordered message list
    Updated(Vec<Message>),

    /// A classified failure to surface
    Error(SessionError),
}

/// Why a message was not sent
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Message text is empty")]
    EmptyText,

    #[error("No preset reply at index {0}")]
    UnknownPreset(usize),

    #[error("No emoji reply at index {0}")]
    UnknownEmoji(usize),

    #[error("No suggestion at index {0}")]
    UnknownSuggestion(usize),

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Default)]
struct ViewState {
    messages: Vec<Message>,
    replies: ReplyPipeline,
    last_error: Option<SessionError>,
}

/// Live view of a session for one role
pub struct SessionView {
    session: String,
    role: Role,
    profile: Profile,
    store: Arc<dyn MessageStore>,
    clock: Arc<LocalClock>,
    assist: Option<AssistService>,
    reply_settings: ReplySettings,
    sync: SyncEngine,
    mute: MuteFlag,
    state: Arc<Mutex<ViewState>>,
    subscription: Option<SubscriptionHandle>,
}

impl SessionView {
    pub fn new(
        store: Arc<dyn MessageStore>,
        session: impl Into<String>,
        role: Role,
        profile: Profile,
        emitter: NotificationEmitter,
        mute: MuteFlag,
    ) -> Self {
        let sync = SyncEngine::new(
            store.clone(),
            profile.identity.clone(),
            role,
            emitter,
            mute.clone(),
        );

        Self {
            session: session.into(),
            role,
            profile,
            store,
            clock: Arc::new(LocalClock::new()),
            assist: None,
            reply_settings: ReplySettings::default(),
            sync,
            mute,
            state: Arc::new(Mutex::new(ViewState::default())),
            subscription: None,
        }
    }

    pub fn with_assist(mut self, assist: AssistService) -> Self {
        self.assist = Some(assist);
        self
    }

    pub fn with_reply_settings(mut self, settings: ReplySettings) -> Self {
        self.reply_settings = settings;
        self
    }

    /// Share a clock between views in the same process
    pub fn with_clock(mut self, clock: Arc<LocalClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    fn state(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe to the session; replaces any previous subscription.
    ///
    /// The returned channel carries every update and error the view sees.
    pub async fn mount(&mut self) -> mpsc::UnboundedReceiver<ViewEvent> {
        self.unmount();

        let (tx, rx) = mpsc::unbounded_channel();
        let update_state = self.state.clone();
        let error_state = self.state.clone();
        let error_tx = tx.clone();
        let role = self.role;

        let handle = self
            .sync
            .subscribe(
                &self.session,
                move |messages| {
                    {
                        let mut state = update_state.lock().unwrap_or_else(|e| e.into_inner());
                        if role == Role::Receiver {
                            state.replies.update(&messages);
                        }
                        state.messages = messages.clone();
                        state.last_error = None;
                    }
                    let _ = tx.send(ViewEvent::Updated(messages));
                },
                move |error| {
                    error_state
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .last_error = Some(error.clone());
                    let _ = error_tx.send(ViewEvent::Error(error));
                },
            )
            .await;

        self.subscription = Some(handle);
        rx
    }

    /// Stop receiving updates. Safe to call when not mounted.
    pub fn unmount(&mut self) {
        if let Some(handle) = self.subscription.take() {
            handle.unsubscribe();
        }
    }

    pub fn is_live(&self) -> bool {
        self.subscription.as_ref().map_or(false, |h| h.is_active())
    }

    /// Current ordered messages for this role
    pub fn messages(&self) -> Vec<Message> {
        self.state().messages.clone()
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.state().last_error.clone()
    }

    pub fn latest_inbound(&self) -> Option<Message> {
        self.state().replies.latest_inbound().cloned()
    }

    pub fn suggestions(&self) -> Vec<String> {
        self.state().replies.suggestions().to_vec()
    }

    pub fn presets(&self) -> &[String] {
        &self.reply_settings.presets
    }

    pub fn emojis(&self) -> &[String] {
        &self.reply_settings.emojis
    }

    pub fn is_muted(&self) -> bool {
        self.mute.is_muted()
    }

    /// Flip the mute flag, returning the new state
    pub fn toggle_mute(&self) -> bool {
        let muted = self.mute.toggle();
        info!(muted, "Notifications toggled");
        muted
    }

    /// Append a message as this role
    #[instrument(skip(self, text), fields(session = %self.session, role = %self.role))]
    pub async fn post(&self, text: &str, kind: MessageKind) -> Result<String, SendError> {
        let text = match kind {
            MessageKind::Text | MessageKind::Preset => text.trim(),
            MessageKind::Emoji => text,
        };
        if text.trim().is_empty() {
            return Err(SendError::EmptyText);
        }

        let message = Message::new(
            text,
            self.role,
            kind,
            self.profile.author(self.role),
            self.clock.next(),
        );

        let id = self
            .store
            .append(&self.session, message)
            .await
            .map_err(|e| e.into_session("append"))?;

        info!(%id, ?kind, "Message sent");
        Ok(id)
    }

    /// Send free text
    pub async fn send_text(&self, text: &str) -> Result<String, SendError> {
        self.post(text, MessageKind::Text).await
    }

    /// Reply with a fixed preset
    pub async fn reply_preset(&self, index: usize) -> Result<String, SendError> {
        let text = self
            .reply_settings
            .presets
            .get(index)
            .cloned()
            .ok_or(SendError::UnknownPreset(index))?;
        self.post(&text, MessageKind::Preset).await
    }

    /// Reply with one of the emoji glyphs
    pub async fn reply_emoji(&self, index: usize) -> Result<String, SendError> {
        let glyph = self
            .reply_settings
            .emojis
            .get(index)
            .cloned()
            .ok_or(SendError::UnknownEmoji(index))?;
        self.post(&glyph, MessageKind::Emoji).await
    }

    /// Reply with a generated suggestion
    pub async fn reply_suggestion(&self, index: usize) -> Result<String, SendError> {
        let text = self
            .suggestions()
            .get(index)
            .cloned()
            .ok_or(SendError::UnknownSuggestion(index))?;
        self.post(&text, MessageKind::Preset).await
    }

    /// Delete every message in the session, returning how many were removed
    #[instrument(skip(self), fields(session = %self.session))]
    pub async fn clear_history(&self) -> Result<usize, SessionError> {
        let messages = self
            .store
            .read_all(&self.session)
            .await
            .map_err(|e| e.into_session("read"))?;

        if messages.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = messages.into_iter().map(|m| m.id).collect();
        self.store
            .delete_all(&self.session, &ids)
            .await
            .map_err(|e| e.into_session("delete"))?;

        info!(count = ids.len(), "Cleared history");
        Ok(ids.len())
    }

    /// Polish a draft; the draft comes back unchanged without assist
    pub async fn refine_draft(&self, draft: &str) -> String {
        match &self.assist {
            Some(assist) => assist.refine(draft).await,
            None => draft.to_string(),
        }
    }

    /// Generate suggestions for the latest inbound if none exist yet.
    ///
    /// The state lock is not held across the completion call, so updates
    /// keep flowing while it runs.
    pub async fn request_suggestions(&self) -> Vec<String> {
        let Some(assist) = &self.assist else {
            return Vec::new();
        };

        let ticket = self.state().replies.begin_suggestions();
        if let Some(ticket) = ticket {
            let replies = assist.suggest_replies(&ticket.text).await;
            self.state().replies.complete_suggestions(&ticket, replies);
        }

        self.suggestions()
    }
}

impl Drop for SessionView {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryMessageStore;

    fn view(store: Arc<MemoryMessageStore>, role: Role) -> SessionView {
        SessionView::new(
            store,
            "test",
            role,
            Profile::guest(None),
            NotificationEmitter::silent(),
            MuteFlag::default(),
        )
    }

    #[tokio::test]
    async fn test_blank_text_is_rejected() {
        let store = Arc::new(MemoryMessageStore::new());
        let sender = view(store.clone(), Role::Sender);

        assert!(matches!(sender.send_text("   ").await, Err(SendError::EmptyText)));
        assert!(store.read_all("test").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_trims_and_snapshots_author() {
        let store = Arc::new(MemoryMessageStore::new());
        let sender = view(store.clone(), Role::Sender);

        sender.send_text("  hello  ").await.unwrap();

        let messages = store.read_all("test").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hello");
        assert_eq!(messages[0].author.display_name, "Sender");
        assert_eq!(messages[0].author.identity, sender.profile().identity);
    }

    #[tokio::test]
    async fn test_preset_and_emoji_replies() {
        let store = Arc::new(MemoryMessageStore::new());
        let receiver = view(store.clone(), Role::Receiver);

        receiver.reply_preset(0).await.unwrap();
        receiver.reply_emoji(0).await.unwrap();
        assert!(matches!(receiver.reply_preset(99).await, Err(SendError::UnknownPreset(99))));

        let messages = store.read_all("test").await.unwrap();
        assert_eq!(messages[0].kind, MessageKind::Preset);
        assert_eq!(messages[0].text, "Got it");
        assert_eq!(messages[1].kind, MessageKind::Emoji);
        assert_eq!(messages[1].text, "👍");
        assert!(messages.iter().all(|m| m.role == Role::Receiver));
    }

    #[tokio::test]
    async fn test_clear_history() {
        let store = Arc::new(MemoryMessageStore::new());
        let sender = view(store.clone(), Role::Sender);

        assert_eq!(sender.clear_history().await.unwrap(), 0);
        sender.send_text("one").await.unwrap();
        sender.send_text("two").await.unwrap();

        assert_eq!(sender.clear_history().await.unwrap(), 2);
        assert!(store.read_all("test").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refine_without_assist_returns_draft() {
        let store = Arc::new(MemoryMessageStore::new());
        let sender = view(store, Role::Sender);
        assert_eq!(sender.refine_draft("rough draft").await, "rough draft");
        assert!(sender.request_suggestions().await.is_empty());
    }

    #[tokio::test]
    async fn test_unmount_is_idempotent() {
        let store = Arc::new(MemoryMessageStore::new());
        let mut sender = view(store, Role::Sender);
        sender.unmount();
        let _events = sender.mount().await;
        assert!(sender.is_live());
        sender.unmount();
        sender.unmount();
        assert!(!sender.is_live());
    }
}
