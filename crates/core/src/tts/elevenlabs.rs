use crate::config::{ApiKey, DEFAULT_ELEVENLABS_BASE_URL, DEFAULT_ELEVENLABS_MODEL};
use crate::decode::decode_audio;
use crate::tts::{classify_http_failure, TtsAudio, TtsClient, TtsError, TtsRequest, VoiceId};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const TTS_TIMEOUT: Duration = Duration::from_secs(30);

/// ElevenLabs neural TTS with a custom (cloned) voice.
#[derive(Clone)]
pub struct ElevenLabsTtsClient {
    client: Client,
    api_key: ApiKey,
    voice: VoiceId,
    model_id: String,
    base_url: String,
}

impl ElevenLabsTtsClient {
    pub fn new(api_key: ApiKey, voice: VoiceId) -> Result<Self, TtsError> {
        let client = Client::builder().timeout(TTS_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            voice,
            model_id: DEFAULT_ELEVENLABS_MODEL.to_owned(),
            base_url: DEFAULT_ELEVENLABS_BASE_URL.to_owned(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    fn url_for(&self, voice: &VoiceId) -> String {
        format!(
            "{}/text-to-speech/{}",
            self.base_url,
            urlencoding::encode(&voice.0)
        )
    }
}

#[derive(Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

impl TtsClient for ElevenLabsTtsClient {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
        async move {
            let voice = request.voice.as_ref().unwrap_or(&self.voice);
            let body = ElevenLabsRequest {
                text: &request.text,
                model_id: &self.model_id,
                voice_settings: VoiceSettings::default(),
            };

            let response = self
                .client
                .post(self.url_for(voice))
                .header("xi-api-key", self.api_key.expose())
                .header("Accept", "audio/mpeg")
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(classify_http_failure(status, body));
            }

            let mp3 = response.bytes().await?;
            Ok(decode_audio(&mp3, Some("mp3"))?)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_id_is_path_encoded() {
        let client = ElevenLabsTtsClient::new(
            ApiKey::new("xi-test").unwrap(),
            VoiceId("abc def".into()),
        )
        .unwrap()
        .with_base_url("http://localhost:9000/v1/");
        assert_eq!(
            client.url_for(&VoiceId("abc def".into())),
            "http://localhost:9000/v1/text-to-speech/abc%20def"
        );
    }

    #[test]
    fn request_body_carries_model_and_settings() {
        let body = ElevenLabsRequest {
            text: "안녕",
            model_id: DEFAULT_ELEVENLABS_MODEL,
            voice_settings: VoiceSettings::default(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model_id"], "eleven_multilingual_v2");
        assert_eq!(json["voice_settings"]["stability"], 0.5);
        assert_eq!(json["voice_settings"]["similarity_boost"], 0.75);
    }
}
