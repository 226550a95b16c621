use crate::chat::{build_messages, ChatClient, ChatError, ChatRequest, WireMessage};
use crate::config::{ApiKey, DEFAULT_CHAT_MODEL, DEFAULT_OPENAI_BASE_URL};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CHAT_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI-compatible `/chat/completions` client.
#[derive(Clone)]
pub struct OpenAiChatClient {
    client: Client,
    api_key: ApiKey,
    base_url: String,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(api_key: ApiKey) -> Result<Self, ChatError> {
        let client = Client::builder().timeout(CHAT_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_OPENAI_BASE_URL.to_owned(),
            model: DEFAULT_CHAT_MODEL.to_owned(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_reply(response: CompletionResponse) -> Result<String, ChatError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
        .ok_or(ChatError::EmptyReply)
}

impl ChatClient for OpenAiChatClient {
    fn complete(&self, request: ChatRequest) -> BoxFuture<'_, Result<String, ChatError>> {
        async move {
            let body = CompletionBody {
                model: &self.model,
                messages: build_messages(&request),
            };
            tracing::debug!(
                target: "chat::openai",
                model = %self.model,
                mode = ?request.mode,
                history = request.history.len(),
                "requesting completion"
            );

            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(self.api_key.expose())
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<unreadable body>".to_owned());
                return Err(ChatError::Api { status, body });
            }

            let parsed: CompletionResponse = response.json().await?;
            first_reply(parsed)
        }
        .boxed()
    }
}
