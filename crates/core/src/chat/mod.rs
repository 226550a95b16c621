mod openai;
mod prompt;

use crate::emotion::Emotion;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiChatClient;
pub use prompt::{build_messages, system_prompt, WireMessage};

const LOG_TARGET: &str = "chat";

/// Spoken when the completion service fails; keeps the cat in character.
pub const APOLOGY_REPLY: &str = "어라? 방금 뭐라고 했는지 잘 모르겠어. 한 번만 더 말해줄래?";

/// Spoken when no chat API key is configured.
pub const MISSING_KEY_REPLY: &str = "앗, 말할 수 있는 열쇠(API 키)가 없어서 대답을 못 하겠어!";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>, emotion: Emotion) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            emotion: Some(emotion),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            emotion: None,
        }
    }
}

/// Which system instruction the cat answers under.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PersonaMode {
    #[default]
    Companion,
    Physiognomy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub message: String,
    pub emotion: Emotion,
    /// Oldest first, already cut to the context window.
    pub history: Vec<ChatTurn>,
    pub mode: PersonaMode,
}

#[derive(thiserror::Error, Debug)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("chat api returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("chat api returned no reply")]
    EmptyReply,
}

pub trait ChatClient: Send + Sync {
    fn complete(&self, request: ChatRequest) -> BoxFuture<'_, Result<String, ChatError>>;
}

/// Wraps an optional chat client and never fails: errors become the scripted
/// apology so the avatar stays in character.
pub struct Conversation<C> {
    client: Option<C>,
}

impl<C: ChatClient> Conversation<C> {
    pub fn new(client: Option<C>) -> Self {
        if client.is_none() {
            tracing::warn!(target: LOG_TARGET, "no chat client configured; replies will be scripted");
        }
        Self { client }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub async fn reply(&self, request: ChatRequest) -> String {
        let Some(client) = &self.client else {
            return MISSING_KEY_REPLY.to_owned();
        };
        let mode = request.mode;
        match client.complete(request).await {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => {
                tracing::warn!(target: LOG_TARGET, ?mode, "empty reply from chat api");
                APOLOGY_REPLY.to_owned()
            }
            Err(e) => {
                tracing::error!(target: LOG_TARGET, ?mode, error = %e, "chat completion failed");
                APOLOGY_REPLY.to_owned()
            }
        }
    }
}
