mod chain;
mod elevenlabs;
mod openai;
mod piper;

use crate::decode::DecodeError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use chain::{SpeechChain, SpokenBy, QUOTA_COOLDOWN};
pub use elevenlabs::ElevenLabsTtsClient;
pub use openai::OpenAiTtsClient;
pub use piper::PiperTtsClient;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceId(pub String);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TtsRequest {
    pub text: String,
    /// Overrides the provider's configured voice.
    pub voice: Option<VoiceId>,
}

impl TtsRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TtsAudio {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub pcm_i16: Vec<i16>,
}

impl TtsAudio {
    pub fn is_empty(&self) -> bool {
        self.pcm_i16.is_empty()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("{0} credentials not configured")]
    MissingCredentials(&'static str),

    #[error("provider quota exhausted")]
    QuotaExhausted,

    #[error("tts request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("tts api returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("tts audio could not be decoded: {0}")]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Other(String),
}

/// One speech synthesis provider.
pub trait TtsClient: Send + Sync {
    fn name(&self) -> &str;
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>>;
}

/// Maps a failed HTTP response onto the error taxonomy. Providers signal an
/// exhausted character quota with 401/429 plus a `quota_exceeded` marker.
pub(crate) fn classify_http_failure(status: u16, body: String) -> TtsError {
    if (status == 401 || status == 429) && body.contains("quota_exceeded") {
        TtsError::QuotaExhausted
    } else {
        TtsError::Api { status, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_marker_maps_to_quota_exhausted() {
        let err = classify_http_failure(401, r#"{"detail":{"status":"quota_exceeded"}}"#.into());
        assert!(matches!(err, TtsError::QuotaExhausted));
    }

    #[test]
    fn other_failures_keep_status() {
        let err = classify_http_failure(401, "invalid api key".into());
        assert!(matches!(err, TtsError::Api { status: 401, .. }));
        let err = classify_http_failure(500, "quota_exceeded".into());
        assert!(matches!(err, TtsError::Api { status: 500, .. }));
    }
}
