//! Audible and haptic notification cues.
//!
//! The emitter is stateless: whether to notify at all (the mute flag) is
//! decided by the caller. Every output is best-effort; a missing or failing
//! sink is logged and otherwise ignored.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::NotificationSettings;

/// A short synthesized tone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration: Duration,
}

/// A brief vibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    pub duration: Duration,
}

/// Audio output capability
pub trait AudioOutput: Send + Sync {
    fn play_tone(&self, tone: Tone) -> Result<()>;
}

/// Haptic output capability
pub trait HapticOutput: Send + Sync {
    fn pulse(&self, pulse: Pulse) -> Result<()>;
}

/// Plays the cue as the terminal bell on stderr
#[derive(Debug, Default)]
pub struct TerminalBell;

impl AudioOutput for TerminalBell {
    fn play_tone(&self, _tone: Tone) -> Result<()> {
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

/// Fires the notification cue on whatever outputs are present
#[derive(Clone)]
pub struct NotificationEmitter {
    audio: Option<Arc<dyn AudioOutput>>,
    haptic: Option<Arc<dyn HapticOutput>>,
    tone: Tone,
    pulse: Pulse,
}

impl NotificationEmitter {
    pub fn new(
        audio: Option<Arc<dyn AudioOutput>>,
        haptic: Option<Arc<dyn HapticOutput>>,
        settings: &NotificationSettings,
    ) -> Self {
        Self {
            audio,
            haptic,
            tone: Tone {
                frequency_hz: settings.tone_hz,
                duration: Duration::from_millis(settings.tone_ms),
            },
            pulse: Pulse {
                duration: Duration::from_millis(settings.haptic_ms),
            },
        }
    }

    /// Emitter with no outputs; `notify` does nothing
    pub fn silent() -> Self {
        Self::new(None, None, &NotificationSettings::default())
    }

    /// Terminal bell, no haptics
    pub fn terminal(settings: &NotificationSettings) -> Self {
        Self::new(Some(Arc::new(TerminalBell)), None, settings)
    }

    /// Play the tone and pulse. Never fails.
    pub fn notify(&self) {
        if let Some(audio) = &self.audio {
            if let Err(e) = audio.play_tone(self.tone) {
                tracing::warn!(error = %e, "Notification tone failed");
            }
        }

        if let Some(haptic) = &self.haptic {
            if let Err(e) = haptic.pulse(self.pulse) {
                tracing::warn!(error = %e, "Haptic pulse failed");
            }
        }
    }
}

impl std::fmt::Debug for NotificationEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationEmitter")
            .field("audio", &self.audio.is_some())
            .field("haptic", &self.haptic.is_some())
            .field("tone", &self.tone)
            .finish()
    }
}

/// User-toggleable mute flag owned by a role view
#[derive(Debug, Clone, Default)]
pub struct MuteFlag(Arc<AtomicBool>);

impl MuteFlag {
    pub fn new(muted: bool) -> Self {
        Self(Arc::new(AtomicBool::new(muted)))
    }

    pub fn is_muted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, muted: bool) {
        self.0.store(muted, Ordering::Relaxed);
    }

    /// Flip the flag, returning the new state
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAudio(Mutex<Vec<Tone>>);

    impl AudioOutput for RecordingAudio {
        fn play_tone(&self, tone: Tone) -> Result<()> {
            self.0.lock().unwrap().push(tone);
            Ok(())
        }
    }

    struct BrokenHaptic;

    impl HapticOutput for BrokenHaptic {
        fn pulse(&self, _pulse: Pulse) -> Result<()> {
            anyhow::bail!("no vibration motor")
        }
    }

    #[test]
    fn test_notify_plays_configured_tone() {
        let audio = Arc::new(RecordingAudio::default());
        let emitter = NotificationEmitter::new(
            Some(audio.clone() as Arc<dyn AudioOutput>),
            None,
            &NotificationSettings::default(),
        );

        emitter.notify();

        let tones = audio.0.lock().unwrap();
        assert_eq!(tones.len(), 1);
        assert_eq!(tones[0].frequency_hz, 880);
        assert_eq!(tones[0].duration, Duration::from_millis(150));
    }

    #[test]
    fn test_failing_output_does_not_propagate() {
        let audio = Arc::new(RecordingAudio::default());
        let emitter = NotificationEmitter::new(
            Some(audio.clone() as Arc<dyn AudioOutput>),
            Some(Arc::new(BrokenHaptic)),
            &NotificationSettings::default(),
        );

        emitter.notify();
        assert_eq!(audio.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_silent_emitter() {
        NotificationEmitter::silent().notify();
    }

    #[test]
    fn test_mute_toggle() {
        let mute = MuteFlag::new(false);
        assert!(mute.toggle());
        assert!(mute.is_muted());
        assert!(!mute.toggle());
        assert!(!mute.is_muted());
    }
}
