//! Continuous speech capture over session-oriented backends.
//!
//! Capture backends end sessions on their own (silence timeouts, OS
//! interruptions). The engine keeps dictation logically continuous by
//! reopening a session whenever one ends while the user still wants to
//! listen. Only an explicit `stop()`, a permission denial, or a failed
//! reopen brings it back to `Idle`.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::domain::{Capability, SessionError};

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Listening,
    /// No capture facility in this environment; never left
    Unsupported,
}

/// One recognized segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub is_final: bool,
}

impl Segment {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Something a capture session reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Current segments of the session
    Results(Vec<Segment>),

    /// The session ended, whether or not it was asked to
    SessionEnded,

    Error(CaptureError),
}

/// Capture failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Speech capture is not supported here")]
    Unsupported,

    #[error("No speech detected")]
    NoSpeech,

    #[error("Capture aborted")]
    Aborted,

    #[error("Failed to start capture session: {0}")]
    Start(String),

    #[error("Capture backend error: {0}")]
    Backend(String),
}

impl CaptureError {
    /// Whether reopening a session could help
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CaptureError::PermissionDenied | CaptureError::Unsupported)
    }

    /// Session-level classification, for errors the user must act on
    pub fn to_session_error(&self) -> Option<SessionError> {
        match self {
            CaptureError::PermissionDenied => Some(SessionError::Permission {
                capability: Capability::Microphone,
            }),
            _ => None,
        }
    }
}

/// Event tagged with the session that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session: u64,
    pub event: CaptureEvent,
}

/// Where a backend session sends its events
#[derive(Debug, Clone)]
pub struct CaptureSink {
    session: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl CaptureSink {
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Deliver an event; returns false once the engine is gone
    pub fn send(&self, event: CaptureEvent) -> bool {
        self.tx
            .send(SessionEvent {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

/// A speech recognizer that works in sessions
#[async_trait]
pub trait CaptureBackend: Send {
    /// Whether capture is possible at all in this environment
    fn is_available(&self) -> bool;

    /// Open a session; its events go to `sink` until it ends
    async fn start_session(&mut self, language: &str, sink: CaptureSink) -> Result<(), CaptureError>;

    /// Ask the current session to end
    async fn stop_session(&mut self);
}

/// Dictation state machine with automatic session restarts
pub struct SpeechCaptureEngine<B: CaptureBackend> {
    backend: B,
    language: String,
    state: CaptureState,
    wants_listening: bool,
    unsupported_reported: bool,
    session: u64,
    restarts: u64,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    transcript: watch::Sender<String>,
}

impl<B: CaptureBackend> SpeechCaptureEngine<B> {
    pub fn new(backend: B, language: impl Into<String>) -> Self {
        let state = if backend.is_available() {
            CaptureState::Idle
        } else {
            CaptureState::Unsupported
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (transcript, _) = watch::channel(String::new());

        Self {
            backend,
            language: language.into(),
            state,
            wants_listening: false,
            unsupported_reported: false,
            session: 0,
            restarts: 0,
            events_tx,
            events_rx,
            transcript,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == CaptureState::Listening
    }

    /// Sessions reopened after an unexpected end
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Current utterance (finals followed by the in-progress segment)
    pub fn transcript(&self) -> String {
        self.transcript.borrow().clone()
    }

    /// Follow transcript updates
    pub fn watch_transcript(&self) -> watch::Receiver<String> {
        self.transcript.subscribe()
    }

    async fn open_session(&mut self) -> Result<(), CaptureError> {
        self.session += 1;
        let sink = CaptureSink {
            session: self.session,
            tx: self.events_tx.clone(),
        };
        self.backend.start_session(&self.language, sink).await
    }

    /// Begin listening; clears the transcript.
    ///
    /// In `Unsupported` this does nothing and reports the condition only
    /// the first time. Already listening is a no-op.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        match self.state {
            CaptureState::Unsupported => {
                if self.unsupported_reported {
                    return Ok(());
                }
                self.unsupported_reported = true;
                warn!("Speech capture not supported");
                return Err(CaptureError::Unsupported);
            }
            CaptureState::Listening => return Ok(()),
            CaptureState::Idle => {}
        }

        self.transcript.send_replace(String::new());
        self.wants_listening = true;

        match self.open_session().await {
            Ok(()) => {
                self.state = CaptureState::Listening;
                info!(language = %self.language, "Listening");
                Ok(())
            }
            Err(e) => {
                self.wants_listening = false;
                warn!(error = %e, "Failed to start capture");
                Err(e)
            }
        }
    }

    /// Stop listening. Results already produced by the session still land.
    pub async fn stop(&mut self) {
        self.wants_listening = false;
        if self.state == CaptureState::Listening {
            self.backend.stop_session().await;
            self.state = CaptureState::Idle;
            info!("Stopped listening");
        }
    }

    /// Start when idle, stop when listening
    pub async fn toggle(&mut self) -> Result<CaptureState, CaptureError> {
        if self.is_listening() {
            self.stop().await;
        } else {
            self.start().await?;
        }
        Ok(self.state)
    }

    /// Apply one backend event.
    ///
    /// Returns a failure the caller should surface; everything else is
    /// handled here.
    pub async fn handle(&mut self, event: SessionEvent) -> Option<CaptureError> {
        if event.session != self.session {
            debug!(session = event.session, current = self.session, "Ignoring event from old session");
            return None;
        }

        match event.event {
            CaptureEvent::Results(segments) => {
                if self.state == CaptureState::Unsupported {
                    return None;
                }
                let finals = segments.iter().filter(|s| s.is_final).map(|s| s.text.as_str());
                let interim = segments.iter().filter(|s| !s.is_final).map(|s| s.text.as_str());
                let text: String = finals.chain(interim).collect();
                if !text.is_empty() {
                    self.transcript.send_replace(text);
                }
                None
            }

            CaptureEvent::SessionEnded => {
                if !(self.wants_listening && self.state == CaptureState::Listening) {
                    return None;
                }

                match self.open_session().await {
                    Ok(()) => {
                        self.restarts += 1;
                        debug!(restarts = self.restarts, "Capture session restarted");
                        None
                    }
                    Err(e) => {
                        self.wants_listening = false;
                        self.state = CaptureState::Idle;
                        warn!(error = %e, "Capture restart failed");
                        Some(e)
                    }
                }
            }

            CaptureEvent::Error(CaptureError::PermissionDenied) => {
                self.wants_listening = false;
                if self.state == CaptureState::Listening {
                    self.backend.stop_session().await;
                    self.state = CaptureState::Idle;
                }
                warn!("Microphone permission denied");
                Some(CaptureError::PermissionDenied)
            }

            CaptureEvent::Error(e) => {
                // The session end that follows drives any restart
                debug!(error = %e, "Capture session error");
                None
            }
        }
    }

    /// Wait for the next backend event and apply it
    pub async fn step(&mut self) -> Option<CaptureError> {
        // The engine holds a sender, so the channel never closes
        let event = self.events_rx.recv().await?;
        self.handle(event).await
    }

    /// Apply every event already queued without waiting
    pub async fn drain(&mut self) -> Vec<CaptureError> {
        let mut failures = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            if let Some(e) = self.handle(event).await {
                failures.push(e);
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that records sinks and can be told to fail
    #[derive(Default)]
    struct FakeBackend {
        unavailable: bool,
        fail_from_session: Option<u64>,
        sinks: Vec<CaptureSink>,
        stops: usize,
    }

    #[async_trait]
    impl CaptureBackend for FakeBackend {
        fn is_available(&self) -> bool {
            !self.unavailable
        }

        async fn start_session(&mut self, _language: &str, sink: CaptureSink) -> Result<(), CaptureError> {
            if self.fail_from_session.map_or(false, |n| sink.session() >= n) {
                return Err(CaptureError::Start("device busy".to_string()));
            }
            self.sinks.push(sink);
            Ok(())
        }

        async fn stop_session(&mut self) {
            self.stops += 1;
        }
    }

    fn current_sink(engine: &SpeechCaptureEngine<FakeBackend>) -> CaptureSink {
        engine.backend.sinks.last().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_results_overwrite_transcript() {
        let mut engine = SpeechCaptureEngine::new(FakeBackend::default(), "ja-JP");
        engine.start().await.unwrap();
        let sink = current_sink(&engine);

        sink.send(CaptureEvent::Results(vec![Segment::interim("hel")]));
        sink.send(CaptureEvent::Results(vec![
            Segment::final_text("hello "),
            Segment::interim("wor"),
        ]));
        engine.drain().await;

        assert_eq!(engine.transcript(), "hello wor");
    }

    #[tokio::test]
    async fn test_start_clears_transcript() {
        let mut engine = SpeechCaptureEngine::new(FakeBackend::default(), "ja-JP");
        engine.start().await.unwrap();
        current_sink(&engine)
            .send(CaptureEvent::Results(vec![Segment::final_text("old")]));
        engine.drain().await;
        engine.stop().await;
        assert_eq!(engine.transcript(), "old");

        engine.start().await.unwrap();
        assert_eq!(engine.transcript(), "");
    }

    #[tokio::test]
    async fn test_stop_prevents_restart() {
        let mut engine = SpeechCaptureEngine::new(FakeBackend::default(), "ja-JP");
        engine.start().await.unwrap();
        let sink = current_sink(&engine);

        engine.stop().await;
        sink.send(CaptureEvent::SessionEnded);
        engine.drain().await;

        assert_eq!(engine.state(), CaptureState::Idle);
        assert_eq!(engine.backend.sinks.len(), 1);
        assert_eq!(engine.restarts(), 0);
    }

    #[tokio::test]
    async fn test_old_session_events_ignored() {
        let mut engine = SpeechCaptureEngine::new(FakeBackend::default(), "ja-JP");
        engine.start().await.unwrap();
        let first = current_sink(&engine);
        first.send(CaptureEvent::SessionEnded);
        engine.drain().await;

        first.send(CaptureEvent::Results(vec![Segment::final_text("stale")]));
        first.send(CaptureEvent::SessionEnded);
        engine.drain().await;

        assert_eq!(engine.transcript(), "");
        assert_eq!(engine.restarts(), 1);
    }

    #[tokio::test]
    async fn test_toggle() {
        let mut engine = SpeechCaptureEngine::new(FakeBackend::default(), "ja-JP");
        assert_eq!(engine.toggle().await.unwrap(), CaptureState::Listening);
        assert_eq!(engine.toggle().await.unwrap(), CaptureState::Idle);
        assert_eq!(engine.backend.stops, 1);
    }

    #[tokio::test]
    async fn test_failed_start_stays_idle() {
        let backend = FakeBackend {
            fail_from_session: Some(1),
            ..Default::default()
        };
        let mut engine = SpeechCaptureEngine::new(backend, "ja-JP");
        assert!(engine.start().await.is_err());
        assert_eq!(engine.state(), CaptureState::Idle);
    }
}
