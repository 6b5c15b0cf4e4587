//! Speech capture.
//!
//! `SpeechCaptureEngine` turns a session-based recognizer into continuous
//! dictation; `LineCaptureBackend` feeds it from text lines.

pub mod capture;
pub mod lines;

pub use capture::{
    CaptureBackend, CaptureError, CaptureEvent, CaptureSink, CaptureState, Segment, SessionEvent,
    SpeechCaptureEngine,
};
pub use lines::LineCaptureBackend;
