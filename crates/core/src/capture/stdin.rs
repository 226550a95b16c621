use crate::capture::{CaptureError, RecognitionEngine, RecognitionEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const LOG_TARGET: &str = "capture::stdin";

/// Treats each line typed on stdin as one finalized utterance.
///
/// Stands in for a microphone recognizer on hosts without one, and makes the
/// conversation loop scriptable (`echo 안녕 | talking-cat talk`).
#[derive(Clone)]
pub struct StdinRecognizer {
    lines: Arc<tokio::sync::Mutex<Lines<BufReader<Stdin>>>>,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
    closed: Arc<AtomicBool>,
}

impl StdinRecognizer {
    pub fn new() -> Self {
        Self {
            lines: Arc::new(tokio::sync::Mutex::new(
                BufReader::new(tokio::io::stdin()).lines(),
            )),
            pending: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for StdinRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognitionEngine for StdinRecognizer {
    fn start(
        &self,
        language: &str,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<(), CaptureError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(CaptureError::InputClosed);
        }
        // Typed lines arrive already transcribed, whatever the language.
        tracing::trace!(target: LOG_TARGET, language, "waiting for a line");

        let lines = Arc::clone(&self.lines);
        let closed = Arc::clone(&self.closed);
        let task = tokio::spawn(async move {
            let next = lines.lock().await.next_line().await;
            match next {
                Ok(Some(line)) => {
                    let _ = events.send(RecognitionEvent::Final(line.trim().to_owned()));
                    let _ = events.send(RecognitionEvent::End);
                }
                Ok(None) => {
                    closed.store(true, Ordering::Relaxed);
                    let _ = events.send(RecognitionEvent::End);
                }
                Err(e) => {
                    let _ = events.send(RecognitionEvent::Error(e.to_string()));
                }
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn stop(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(task) = pending.take() {
            task.abort();
        }
    }
}
