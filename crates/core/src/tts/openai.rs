use crate::config::{
    ApiKey, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_TTS_MODEL, DEFAULT_OPENAI_TTS_VOICE,
};
use crate::decode::decode_audio;
use crate::tts::{classify_http_failure, TtsAudio, TtsClient, TtsError, TtsRequest, VoiceId};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const TTS_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI `/audio/speech` with a stock voice.
#[derive(Clone)]
pub struct OpenAiTtsClient {
    client: Client,
    api_key: ApiKey,
    base_url: String,
    model: String,
    voice: VoiceId,
}

impl OpenAiTtsClient {
    pub fn new(api_key: ApiKey) -> Result<Self, TtsError> {
        let client = Client::builder().timeout(TTS_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_OPENAI_BASE_URL.to_owned(),
            model: DEFAULT_OPENAI_TTS_MODEL.to_owned(),
            voice: VoiceId(DEFAULT_OPENAI_TTS_VOICE.to_owned()),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_voice(mut self, voice: VoiceId) -> Self {
        self.voice = voice;
        self
    }
}

#[derive(Serialize)]
struct SpeechBody<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'static str,
}

impl TtsClient for OpenAiTtsClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<TtsAudio, TtsError>> {
        async move {
            let voice = request.voice.as_ref().unwrap_or(&self.voice);
            let body = SpeechBody {
                model: &self.model,
                voice: &voice.0,
                input: &request.text,
                response_format: "mp3",
            };

            let response = self
                .client
                .post(format!("{}/audio/speech", self.base_url))
                .bearer_auth(self.api_key.expose())
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
    fn body_uses_stock_voice() {
        let body = SpeechBody {
            model: DEFAULT_OPENAI_TTS_MODEL,
            voice: DEFAULT_OPENAI_TTS_VOICE,
            input: "안녕",
            response_format: "mp3",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "tts-1",
                "voice": "nova",
                "input": "안녕",
                "response_format": "mp3"
            })
        );
    }
}
