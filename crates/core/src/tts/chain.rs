use crate::playback::PlaybackSink;
use crate::tts::{TtsClient, TtsError, TtsRequest};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// How long a provider that ran out of quota is skipped before it is tried
/// again.
pub const QUOTA_COOLDOWN: Duration = Duration::from_secs(300);
const LOG_TARGET: &str = "tts::chain";

struct ProviderSlot {
    client: Arc<dyn TtsClient>,
    exhausted_at: Mutex<Option<Instant>>,
}

impl ProviderSlot {
    fn new(client: Arc<dyn TtsClient>) -> Self {
        Self {
            client,
            exhausted_at: Mutex::new(None),
        }
    }

    fn exhausted_at(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.exhausted_at.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn cooling_down(&self) -> bool {
        self.exhausted_at()
            .map(|t| t.elapsed() < QUOTA_COOLDOWN)
            .unwrap_or(false)
    }

    fn mark_exhausted(&self) {
        *self.exhausted_at() = Some(Instant::now());
    }

    fn mark_healthy(&self) {
        let mut exhausted_at = self.exhausted_at();
        if exhausted_at.take().is_some() {
            tracing::info!(target: LOG_TARGET, provider = self.client.name(), "provider recovered from quota exhaustion");
        }
    }
}

/// Which link of the chain ended up producing the audible reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpokenBy {
    Provider(String),
    Local,
    Silent,
}

impl fmt::Display for SpokenBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpokenBy::Provider(name) => f.write_str(name),
            SpokenBy::Local => f.write_str("local"),
            SpokenBy::Silent => f.write_str("silent"),
        }
    }
}

/// Raises the speaking flag for one `speak` call and lowers it when the last
/// overlapping call exits, however it exits.
struct SpeakingGuard<'a> {
    speaking: &'a watch::Sender<bool>,
    active: &'a Mutex<usize>,
}

impl<'a> SpeakingGuard<'a> {
    fn enter(speaking: &'a watch::Sender<bool>, active: &'a Mutex<usize>) -> Self {
        let mut count = active.lock().unwrap_or_else(|p| p.into_inner());
        *count += 1;
        speaking.send_replace(true);
        drop(count);
        Self { speaking, active }
    }
}

impl Drop for SpeakingGuard<'_> {
    fn drop(&mut self) {
        let mut count = self.active.lock().unwrap_or_else(|p| p.into_inner());
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.speaking.send_replace(false);
        }
    }
}

/// Ordered text-to-speech fallback chain sharing one playback handle.
///
/// Remote providers are tried in insertion order; the first one whose audio
/// plays wins. The local synthesizer runs last and its failures are only
/// logged, so from the caller's side speaking never fails.
pub struct SpeechChain {
    providers: Vec<ProviderSlot>,
    local: Option<Arc<dyn TtsClient>>,
    playback: Arc<dyn PlaybackSink>,
    speaking: watch::Sender<bool>,
    active: Mutex<usize>,
}

impl SpeechChain {
    pub fn new(playback: Arc<dyn PlaybackSink>) -> Self {
        let (speaking, _) = watch::channel(false);
        Self {
            providers: Vec::new(),
            local: None,
            playback,
            speaking,
            active: Mutex::new(0),
        }
    }

    pub fn with_provider(mut self, client: Arc<dyn TtsClient>) -> Self {
        self.providers.push(ProviderSlot::new(client));
        self
    }

    pub fn with_local(mut self, client: Arc<dyn TtsClient>) -> Self {
        self.local = Some(client);
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.client.name()).collect()
    }

    pub fn subscribe_speaking(&self) -> watch::Receiver<bool> {
        self.speaking.subscribe()
    }

    pub fn is_speaking(&self) -> bool {
        *self.speaking.borrow()
    }

    /// Cuts off whatever is playing right now.
    pub fn stop(&self) {
        self.playback.stop();
    }

    pub async fn speak(&self, text: &str) -> SpokenBy {
        let text = text.trim();
        if text.is_empty() {
            return SpokenBy::Silent;
        }

        let _guard = SpeakingGuard::enter(&self.speaking, &self.active);

        for slot in &self.providers {
            let provider = slot.client.name();
            if slot.cooling_down() {
                tracing::debug!(target: LOG_TARGET, provider, "skipping provider during quota cooldown");
                continue;
            }

            match slot.client.synthesize(TtsRequest::new(text)).await {
                Ok(audio) => {
                    slot.mark_healthy();
                    match self.playback.play(audio).await {
                        Ok(()) => return SpokenBy::Provider(provider.to_owned()),
                        Err(e) => {
                            tracing::warn!(target: LOG_TARGET, provider, error = %e, "playback failed; trying next provider");
                        }
                    }
                }
                Err(TtsError::QuotaExhausted) => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        provider,
                        cooldown_secs = QUOTA_COOLDOWN.as_secs(),
                        "provider quota exhausted; skipping it for a while"
                    );
                    slot.mark_exhausted();
                }
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, provider, error = %e, "tts provider failed; trying next");
                }
            }
        }

        self.speak_locally(text).await
    }

    async fn speak_locally(&self, text: &str) -> SpokenBy {
        let Some(local) = &self.local else {
            tracing::warn!(target: LOG_TARGET, "all tts providers failed and no local synthesizer is configured");
            return SpokenBy::Silent;
        };

        let audio = match local.synthesize(TtsRequest::new(text)).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, provider = local.name(), error = %e, "local synthesis failed; reply stays silent");
                return SpokenBy::Silent;
            }
        };

        match self.playback.play(audio).await {
            Ok(()) => SpokenBy::Local,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "local playback failed; reply stays silent");
                SpokenBy::Silent
            }
        }
    }
}
