mod stdin;

use crate::config::DEFAULT_LANGUAGE;
use tokio::sync::mpsc;

pub use stdin::StdinRecognizer;

const LOG_TARGET: &str = "capture";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecognitionEvent {
    Interim(String),
    Final(String),
    Error(String),
    End,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("speech recognition is not supported here")]
    Unsupported,

    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("recognition engine failed to start: {0}")]
    EngineFailed(String),

    #[error("speech input closed")]
    InputClosed,
}

/// A continuous speech-to-text engine. Results are delivered on the channel
/// handed to `start`; the engine reports `End` when it stops on its own.
///
/// `language` is a BCP 47 tag such as `ko-KR`.
pub trait RecognitionEngine: Send + Sync {
    fn start(
        &self,
        language: &str,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<(), CaptureError>;
    fn stop(&self);
}

/// Listening state and the finalized transcript for one recognition engine.
pub struct SpeechCapture<E> {
    engine: E,
    language: String,
    listening: bool,
    transcript: String,
    events_tx: mpsc::UnboundedSender<RecognitionEvent>,
    events_rx: mpsc::UnboundedReceiver<RecognitionEvent>,
}

impl<E: RecognitionEngine> SpeechCapture<E> {
    pub fn new(engine: E) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            language: DEFAULT_LANGUAGE.to_owned(),
            listening: false,
            transcript: String::new(),
            events_tx,
            events_rx,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Arms the engine. A second start while listening does nothing.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.listening {
            tracing::debug!(target: LOG_TARGET, "already listening; start ignored");
            return Ok(());
        }
        // Events from an earlier session must not leak into this one.
        while self.events_rx.try_recv().is_ok() {}
        self.transcript.clear();
        self.engine.start(&self.language, self.events_tx.clone())?;
        self.listening = true;
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.listening {
            return;
        }
        self.engine.stop();
        self.listening = false;
    }

    pub fn apply(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Interim(text) => {
                tracing::trace!(target: LOG_TARGET, %text, "interim result");
            }
            RecognitionEvent::Final(text) => {
                tracing::debug!(target: LOG_TARGET, %text, "final result");
                self.transcript = text;
            }
            RecognitionEvent::Error(error) => {
                tracing::warn!(target: LOG_TARGET, %error, "speech recognition error");
                self.listening = false;
            }
            RecognitionEvent::End => {
                self.listening = false;
            }
        }
    }

    /// Takes the finalized transcript, leaving it empty.
    pub fn take_transcript(&mut self) -> Option<String> {
        if self.transcript.trim().is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.transcript))
    }

    /// Listens for one utterance and returns it once finalized.
    ///
    /// Returns `Ok(None)` when recognition ended (or failed) before anything
    /// was finalized; the caller may simply listen again.
    pub async fn listen(&mut self) -> Result<Option<String>, CaptureError> {
        self.start()?;
        while self.listening {
            let Some(event) = self.events_rx.recv().await else {
                self.listening = false;
                break;
            };
            self.apply(event);
            if let Some(text) = self.take_transcript() {
                self.stop();
                return Ok(Some(text));
            }
        }
        Ok(self.take_transcript())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays one scripted batch of events per start.
    #[derive(Clone, Default)]
    struct ScriptedEngine {
        scripts: Arc<Mutex<Vec<Vec<RecognitionEvent>>>>,
        languages: Arc<Mutex<Vec<String>>>,
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    impl ScriptedEngine {
        fn with_script(self, events: Vec<RecognitionEvent>) -> Self {
            self.scripts.lock().unwrap().push(events);
            self
        }
    }

    impl RecognitionEngine for ScriptedEngine {
        fn start(
            &self,
            language: &str,
            events: mpsc::UnboundedSender<RecognitionEvent>,
        ) -> Result<(), CaptureError> {
            self.starts.fetch_add(1, Ordering::Relaxed);
            self.languages.lock().unwrap().push(language.to_owned());
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                return Err(CaptureError::InputClosed);
            }
            for event in scripts.remove(0) {
                let _ = events.send(event);
            }
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[tokio::test]
    async fn only_final_results_update_transcript() {
        let engine = ScriptedEngine::default().with_script(vec![
            RecognitionEvent::Interim("안".into()),
            RecognitionEvent::Final("안녕".into()),
        ]);
        let mut capture = SpeechCapture::new(engine.clone());

        assert_eq!(capture.listen().await, Ok(Some("안녕".to_owned())));
        assert!(!capture.is_listening());
        assert_eq!(capture.transcript(), "");
        assert_eq!(engine.stops.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn error_clears_listening_and_allows_retry() {
        let engine = ScriptedEngine::default()
            .with_script(vec![
                RecognitionEvent::Interim("어".into()),
                RecognitionEvent::Error("no-speech".into()),
            ])
            .with_script(vec![RecognitionEvent::Final("다시".into())]);
        let mut capture = SpeechCapture::new(engine);

        assert_eq!(capture.listen().await, Ok(None));
        assert!(!capture.is_listening());
        assert_eq!(capture.listen().await, Ok(Some("다시".to_owned())));
    }

    #[tokio::test]
    async fn end_without_final_yields_nothing() {
        let engine = ScriptedEngine::default().with_script(vec![RecognitionEvent::End]);
        let mut capture = SpeechCapture::new(engine);
        assert_eq!(capture.listen().await, Ok(None));
    }

    #[test]
    fn start_while_listening_is_a_no_op() {
        let engine = ScriptedEngine::default()
            .with_script(vec![])
            .with_script(vec![]);
        let mut capture = SpeechCapture::new(engine.clone());

        capture.start().expect("first start");
        capture.start().expect("second start ignored");
        assert!(capture.is_listening());
        assert_eq!(engine.starts.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn stop_when_idle_changes_nothing() {
        let engine = ScriptedEngine::default();
        let mut capture = SpeechCapture::new(engine.clone());

        capture.stop();
        capture.stop();
        assert!(!capture.is_listening());
        assert_eq!(engine.stops.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn start_clears_previous_transcript() {
        let engine = ScriptedEngine::default().with_script(vec![]);
        let mut capture = SpeechCapture::new(engine);
        capture.apply(RecognitionEvent::Final("old".into()));
        assert_eq!(capture.transcript(), "old");

        capture.start().expect("start");
        assert_eq!(capture.transcript(), "");
    }

    #[tokio::test]
    async fn engine_is_started_in_the_configured_language() {
        let engine = ScriptedEngine::default()
            .with_script(vec![RecognitionEvent::Final("안녕".into())])
            .with_script(vec![RecognitionEvent::Final("hello".into())]);

        let mut capture = SpeechCapture::new(engine.clone());
        assert_eq!(capture.language(), "ko-KR");
        capture.listen().await.expect("first utterance");

        let mut capture = SpeechCapture::new(engine.clone()).with_language("en-US");
        capture.listen().await.expect("second utterance");

        assert_eq!(*engine.languages.lock().unwrap(), vec!["ko-KR", "en-US"]);
    }

    #[tokio::test]
    async fn closed_input_is_reported() {
        let mut capture = SpeechCapture::new(ScriptedEngine::default());
        assert_eq!(capture.listen().await, Err(CaptureError::InputClosed));
        assert!(!capture.is_listening());
    }
}
