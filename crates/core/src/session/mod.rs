//! One talking-cat session: listens, reads the face, answers and speaks.
//!
//! The session is driven through `&mut self`, so at most one reply is ever
//! pending and only one recognition session runs at a time.

use crate::capture::{CaptureError, RecognitionEngine, SpeechCapture};
use crate::chat::{ChatClient, ChatRequest, ChatTurn, Conversation, PersonaMode};
use crate::emotion::Emotion;
use crate::face::FaceState;
use crate::history::{HistoryStore, PhysiognomyRecord};
use crate::physiognomy::{AnimalClassifier, PhysiognomyError, PhysiognomyFeatures};
use crate::tts::{SpeechChain, SpokenBy};
use bytes::Bytes;
use tokio::sync::watch;

const LOG_TARGET: &str = "session";

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("no face in view")]
    NoFace,

    #[error(transparent)]
    Physiognomy(#[from] PhysiognomyError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// One completed turn of conversation.
#[derive(Clone, Debug, PartialEq)]
pub struct Exchange {
    pub user: String,
    pub emotion: Emotion,
    pub reply: String,
    pub spoken_by: SpokenBy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PhysiognomyReading {
    pub features: PhysiognomyFeatures,
    pub emotion: Emotion,
    pub reply: String,
    pub spoken_by: SpokenBy,
}

pub struct CatSession<C> {
    conversation: Conversation<C>,
    speech: SpeechChain,
    history: HistoryStore,
    face: watch::Receiver<FaceState>,
}

impl<C: ChatClient> CatSession<C> {
    pub fn new(
        conversation: Conversation<C>,
        speech: SpeechChain,
        history: HistoryStore,
        face: watch::Receiver<FaceState>,
    ) -> Self {
        Self {
            conversation,
            speech,
            history,
            face,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn speech(&self) -> &SpeechChain {
        &self.speech
    }

    pub fn face_state(&self) -> FaceState {
        self.face.borrow().clone()
    }

    /// Answers one utterance. Blank input is ignored.
    pub async fn handle_utterance(&mut self, text: &str) -> Option<Exchange> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let emotion = self.face.borrow().emotion;
        tracing::info!(target: LOG_TARGET, %emotion, "user said: {text}");

        let request = ChatRequest {
            message: text.to_owned(),
            emotion,
            history: self.history.context(),
            mode: PersonaMode::Companion,
        };
        let reply = self.conversation.reply(request).await;

        self.history.append(ChatTurn::user(text, emotion)).await;
        self.history.append(ChatTurn::assistant(reply.clone())).await;

        tracing::info!(target: LOG_TARGET, "cat replied: {reply}");
        let spoken_by = self.speech.speak(&reply).await;

        Some(Exchange {
            user: text.to_owned(),
            emotion,
            reply,
            spoken_by,
        })
    }

    /// Reads the face currently in view under the fortune-teller persona.
    ///
    /// The animal look-alike is optional: without a classifier or an image,
    /// or when classification fails, the reading uses geometry alone.
    pub async fn read_face(
        &mut self,
        classifier: Option<&dyn AnimalClassifier>,
        image: Option<Bytes>,
    ) -> Result<PhysiognomyReading, SessionError> {
        let (landmarks, emotion) = {
            let state = self.face.borrow();
            if !state.is_face_detected() || state.landmarks.is_empty() {
                return Err(SessionError::NoFace);
            }
            (state.landmarks.clone(), state.emotion)
        };

        let features = PhysiognomyFeatures::from_landmarks(&landmarks)?;
        let animal = match (classifier, image) {
            (Some(classifier), Some(image)) => match classifier.classify(image).await {
                Ok(ranked) => ranked.into_iter().next(),
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, error = %e, "animal classification failed; reading geometry only");
                    None
                }
            },
            _ => None,
        };
        let features = features.with_animal(animal);
        tracing::info!(target: LOG_TARGET, %features, "face measured");

        let reply = self
            .conversation
            .reply(ChatRequest {
                message: features.describe(),
                emotion,
                history: Vec::new(),
                mode: PersonaMode::Physiognomy,
            })
            .await;

        self.history.record_physiognomy(PhysiognomyRecord {
            features: features.clone(),
            response: reply.clone(),
            emotion,
        });
        let spoken_by = self.speech.speak(&reply).await;

        Ok(PhysiognomyReading {
            features,
            emotion,
            reply,
            spoken_by,
        })
    }

    /// Listens and answers until the speech input closes. Returns the number
    /// of exchanges handled.
    pub async fn run<E: RecognitionEngine>(
        &mut self,
        capture: &mut SpeechCapture<E>,
        mut on_exchange: impl FnMut(&Exchange),
    ) -> Result<usize, SessionError> {
        let mut exchanges = 0;
        loop {
            match capture.listen().await {
                Ok(Some(text)) => {
                    if let Some(exchange) = self.handle_utterance(&text).await {
                        on_exchange(&exchange);
                        exchanges += 1;
                    }
                }
                Ok(None) => continue,
                Err(CaptureError::InputClosed) => {
                    tracing::info!(target: LOG_TARGET, exchanges, "speech input closed");
                    return Ok(exchanges);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Stops playback and waits for background history writes.
    pub async fn shutdown(mut self) {
        self.speech.stop();
        self.history.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RecognitionEvent;
    use crate::chat::{ChatError, Role, APOLOGY_REPLY};
    use crate::config::HistoryWindow;
    use crate::emotion::EmotionSample;
    use crate::face::{DetectorStatus, Landmark};
    use crate::physiognomy::{
        AnimalMatch, ClassifierError, EyeSize, ForeheadSize, BROW_CENTER, CHIN, FACE_LEFT_EDGE,
        FACE_RIGHT_EDGE, FOREHEAD_TOP, LEFT_EYE_LOWER, LEFT_EYE_UPPER, RIGHT_EYE_LOWER,
        RIGHT_EYE_UPPER,
    };
    use crate::playback::MutePlayback;
    use crate::tts::{TtsAudio, TtsClient, TtsError, TtsRequest};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[derive(Clone, Default)]
    struct RecordingChat {
        seen: Arc<Mutex<Vec<ChatRequest>>>,
        fail: bool,
    }

    impl ChatClient for RecordingChat {
        fn complete(&self, request: ChatRequest) -> BoxFuture<'_, Result<String, ChatError>> {
            let reply = format!("냥! ({})", request.message);
            self.seen.lock().unwrap().push(request);
            let fail = self.fail;
            async move {
                if fail {
                    Err(ChatError::EmptyReply)
                } else {
                    Ok(reply)
                }
            }
            .boxed()
        }
    }

    struct CountingTts {
        name: &'static str,
        ok: bool,
        calls: AtomicUsize,
    }

    impl CountingTts {
        fn new(name: &'static str, ok: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                ok,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl TtsClient for CountingTts {
        fn name(&self) -> &str {
            self.name
        }

        fn synthesize(&self, _request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let ok = self.ok;
            async move {
                if ok {
                    Ok(TtsAudio {
                        sample_rate_hz: 44_100,
                        channels: 1,
                        pcm_i16: vec![0; 16],
                    })
                } else {
                    Err(TtsError::Other("offline".into()))
                }
            }
            .boxed()
        }
    }

    struct FixedClassifier;

    impl AnimalClassifier for FixedClassifier {
        fn classify(
            &self,
            _image: Bytes,
        ) -> BoxFuture<'_, Result<Vec<AnimalMatch>, ClassifierError>> {
            async {
                Ok(vec![
                    AnimalMatch {
                        label: "고양이상".into(),
                        probability: 0.8,
                    },
                    AnimalMatch {
                        label: "강아지상".into(),
                        probability: 0.2,
                    },
                ])
            }
            .boxed()
        }
    }

    struct BrokenClassifier;

    impl AnimalClassifier for BrokenClassifier {
        fn classify(
            &self,
            _image: Bytes,
        ) -> BoxFuture<'_, Result<Vec<AnimalMatch>, ClassifierError>> {
            async { Err(ClassifierError::Empty) }.boxed()
        }
    }

    fn face_with(sample: EmotionSample, landmarks: Vec<Landmark>) -> FaceState {
        let emotion = sample.classify();
        FaceState {
            status: DetectorStatus::Tracking {
                emotion,
                percent: sample.display_percent(emotion),
            },
            emotion,
            sample,
            landmarks,
        }
    }

    /// Small eyes, narrow forehead.
    fn mesh() -> Vec<Landmark> {
        let mut points = vec![Landmark::new(0.5, 0.5); 468];
        points[FACE_LEFT_EDGE] = Landmark::new(0.3, 0.5);
        points[FACE_RIGHT_EDGE] = Landmark::new(0.7, 0.5);
        points[LEFT_EYE_UPPER] = Landmark::new(0.4, 0.4);
        points[LEFT_EYE_LOWER] = Landmark::new(0.4, 0.416);
        points[RIGHT_EYE_UPPER] = Landmark::new(0.6, 0.4);
        points[RIGHT_EYE_LOWER] = Landmark::new(0.6, 0.416);
        points[FOREHEAD_TOP] = Landmark::new(0.5, 0.2);
        points[BROW_CENTER] = Landmark::new(0.5, 0.3);
        points[CHIN] = Landmark::new(0.5, 0.7);
        points
    }

    struct Harness {
        session: CatSession<RecordingChat>,
        chat: RecordingChat,
        elevenlabs: Arc<CountingTts>,
        openai: Arc<CountingTts>,
        _face_tx: watch::Sender<FaceState>,
    }

    fn harness(chat: RecordingChat, face: FaceState, elevenlabs_ok: bool) -> Harness {
        let elevenlabs = CountingTts::new("elevenlabs", elevenlabs_ok);
        let openai = CountingTts::new("openai", true);
        let speech = SpeechChain::new(Arc::new(MutePlayback::new()))
            .with_provider(elevenlabs.clone())
            .with_provider(openai.clone());
        let (face_tx, face_rx) = watch::channel(face);
        let session = CatSession::new(
            Conversation::new(Some(chat.clone())),
            speech,
            HistoryStore::in_memory(HistoryWindow::default()),
            face_rx,
        );
        Harness {
            session,
            chat,
            elevenlabs,
            openai,
            _face_tx: face_tx,
        }
    }

    #[tokio::test]
    async fn greeting_with_neutral_face_goes_through_the_whole_loop() {
        let mut h = harness(
            RecordingChat::default(),
            face_with(EmotionSample::new(0.1, 0.05), Vec::new()),
            true,
        );
        for i in 0..12 {
            h.session
                .history
                .append(ChatTurn::assistant(format!("earlier {i}")))
                .await;
        }

        let exchange = h.session.handle_utterance("안녕").await.unwrap();

        let seen = h.chat.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message, "안녕");
        assert_eq!(seen[0].emotion, Emotion::Neutral);
        assert_eq!(seen[0].mode, PersonaMode::Companion);
        assert_eq!(seen[0].history.len(), 10);
        assert_eq!(seen[0].history[0].content, "earlier 2");
        assert_eq!(seen[0].history[9].content, "earlier 11");

        assert_eq!(exchange.emotion, Emotion::Neutral);
        assert_eq!(exchange.spoken_by, SpokenBy::Provider("elevenlabs".into()));
        assert_eq!(h.elevenlabs.calls.load(Ordering::Relaxed), 1);
        assert_eq!(h.openai.calls.load(Ordering::Relaxed), 0);

        let turns = h.session.history().turns();
        assert_eq!(turns.len(), 14);
        assert_eq!(turns[12].role, Role::User);
        assert_eq!(turns[12].emotion, Some(Emotion::Neutral));
        assert_eq!(turns[13].role, Role::Assistant);
        assert!(!h.session.speech().is_speaking());
    }

    #[tokio::test]
    async fn blank_utterance_is_ignored() {
        let mut h = harness(RecordingChat::default(), FaceState::inactive(), true);
        assert!(h.session.handle_utterance("  ").await.is_none());
        assert!(h.chat.seen.lock().unwrap().is_empty());
        assert!(h.session.history().is_empty());
    }

    #[tokio::test]
    async fn chat_failure_is_answered_with_apology_and_spoken() {
        let chat = RecordingChat {
            fail: true,
            ..Default::default()
        };
        let mut h = harness(chat, FaceState::inactive(), false);
        let exchange = h.session.handle_utterance("뭐해?").await.unwrap();
        assert_eq!(exchange.reply, APOLOGY_REPLY);
        assert_eq!(exchange.spoken_by, SpokenBy::Provider("openai".into()));
        assert_eq!(h.session.history().len(), 2);
    }

    #[tokio::test]
    async fn happy_face_is_passed_along() {
        let mut h = harness(
            RecordingChat::default(),
            face_with(EmotionSample::new(0.6, 0.0), Vec::new()),
            true,
        );
        let exchange = h.session.handle_utterance("좋은 아침").await.unwrap();
        assert_eq!(exchange.emotion, Emotion::Happy);
    }

    #[tokio::test]
    async fn face_reading_uses_geometry_and_top_animal() {
        let mut h = harness(
            RecordingChat::default(),
            face_with(EmotionSample::new(0.0, 0.0), mesh()),
            true,
        );
        let reading = h
            .session
            .read_face(Some(&FixedClassifier), Some(Bytes::from_static(b"jpeg")))
            .await
            .unwrap();

        assert_eq!(reading.features.eyes, EyeSize::Small);
        assert_eq!(reading.features.forehead, ForeheadSize::Narrow);
        assert_eq!(reading.features.animal.as_ref().unwrap().label, "고양이상");

        let seen = h.chat.seen.lock().unwrap().clone();
        assert_eq!(seen[0].mode, PersonaMode::Physiognomy);
        assert!(seen[0].history.is_empty());
        assert!(seen[0].message.contains("고양이상"));
        assert!(h.session.history().is_empty());
    }

    #[tokio::test]
    async fn classifier_failure_still_reads_the_face() {
        let mut h = harness(
            RecordingChat::default(),
            face_with(EmotionSample::new(0.0, 0.0), mesh()),
            true,
        );
        let reading = h
            .session
            .read_face(Some(&BrokenClassifier), Some(Bytes::from_static(b"jpeg")))
            .await
            .unwrap();
        assert!(reading.features.animal.is_none());
    }

    #[tokio::test]
    async fn face_reading_needs_a_face() {
        let mut h = harness(RecordingChat::default(), FaceState::inactive(), true);
        let err = h.session.read_face(None, None).await.unwrap_err();
        assert!(matches!(err, SessionError::NoFace));
    }

    /// Delivers each queued line as one finalized utterance, then closes.
    struct QueuedEngine {
        lines: Mutex<Vec<&'static str>>,
    }

    impl RecognitionEngine for QueuedEngine {
        fn start(
            &self,
            _language: &str,
            events: mpsc::UnboundedSender<RecognitionEvent>,
        ) -> Result<(), CaptureError> {
            let mut lines = self.lines.lock().unwrap();
            if lines.is_empty() {
                return Err(CaptureError::InputClosed);
            }
            let line = lines.remove(0);
            let _ = events.send(RecognitionEvent::Final(line.to_owned()));
            let _ = events.send(RecognitionEvent::End);
            Ok(())
        }

        fn stop(&self) {}
    }

    #[tokio::test]
    async fn run_answers_until_input_closes() {
        let mut h = harness(RecordingChat::default(), FaceState::inactive(), true);
        let mut capture = SpeechCapture::new(QueuedEngine {
            lines: Mutex::new(vec!["안녕", "배고파"]),
        });

        let mut heard = Vec::new();
        let handled = h
            .session
            .run(&mut capture, |exchange| heard.push(exchange.user.clone()))
            .await
            .unwrap();
        assert_eq!(handled, 2);
        assert_eq!(heard, vec!["안녕", "배고파"]);
        assert_eq!(h.session.history().len(), 4);
        h.session.shutdown().await;
    }
}
