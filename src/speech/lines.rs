//! Line-oriented capture backend.
//!
//! Treats each input line as a finalized utterance segment, which makes
//! dictation usable from a terminal or a piped speech-to-text tool:
//! - a non-blank line extends the session's transcript
//! - a blank line ends the session (like a silence timeout)
//! - end of input ends the session and makes further sessions fail

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::capture::{CaptureBackend, CaptureError, CaptureEvent, CaptureSink, Segment};

pub struct LineCaptureBackend<R> {
    lines: Arc<Mutex<Lines<R>>>,
    exhausted: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl LineCaptureBackend<BufReader<Stdin>> {
    /// Read utterances from standard input
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> LineCaptureBackend<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: Arc::new(Mutex::new(reader.lines())),
            exhausted: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Whether the input has ended
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }
}

async fn read_session<R>(lines: Arc<Mutex<Lines<R>>>, exhausted: Arc<AtomicBool>, sink: CaptureSink)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let mut finals: Vec<String> = Vec::new();

    loop {
        let line = {
            let mut guard = lines.lock().await;
            guard.next_line().await
        };

        match line {
            Ok(Some(line)) if line.trim().is_empty() => {
                sink.send(CaptureEvent::SessionEnded);
                return;
            }
            Ok(Some(line)) => {
                finals.push(line.trim().to_string());
                let results = CaptureEvent::Results(vec![Segment::final_text(finals.join(" "))]);
                if !sink.send(results) {
                    return;
                }
            }
            Ok(None) => {
                exhausted.store(true, Ordering::SeqCst);
                sink.send(CaptureEvent::SessionEnded);
                return;
            }
            Err(e) => {
                exhausted.store(true, Ordering::SeqCst);
                sink.send(CaptureEvent::Error(CaptureError::Backend(e.to_string())));
                sink.send(CaptureEvent::SessionEnded);
                return;
            }
        }
    }
}

#[async_trait]
impl<R> CaptureBackend for LineCaptureBackend<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn is_available(&self) -> bool {
        true
    }

    async fn start_session(&mut self, _language: &str, sink: CaptureSink) -> Result<(), CaptureError> {
        if self.is_exhausted() {
            return Err(CaptureError::Start("input closed".to_string()));
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }

        self.task = Some(tokio::spawn(read_session(
            self.lines.clone(),
            self.exhausted.clone(),
            sink,
        )));
        Ok(())
    }

    async fn stop_session(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<R> Drop for LineCaptureBackend<R> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::capture::{CaptureState, SpeechCaptureEngine};
    use std::time::Duration;

    #[tokio::test]
    async fn test_dictation_across_sessions_until_eof() {
        let input: &'static [u8] = b"hello\nworld\n\nagain\n";
        let backend = LineCaptureBackend::new(BufReader::new(input));
        let mut engine = SpeechCaptureEngine::new(backend, "en-US");

        engine.start().await.unwrap();

        let mut transcripts = Vec::new();
        let mut failure = None;
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.is_listening() {
                if let Some(e) = engine.step().await {
                    failure = Some(e);
                }
                transcripts.push(engine.transcript());
            }
        })
        .await
        .unwrap();

        assert!(transcripts.contains(&"hello world".to_string()));
        assert_eq!(engine.transcript(), "again");
        assert_eq!(engine.restarts(), 1);
        assert_eq!(engine.state(), CaptureState::Idle);
        assert!(matches!(failure, Some(CaptureError::Start(_))));
        assert!(engine.backend().is_exhausted());
    }
}
