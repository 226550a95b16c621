use crate::chat::ChatTurn;
use crate::config::SupabaseConfig;
use crate::emotion::Emotion;
use crate::physiognomy::PhysiognomyFeatures;
use crate::util::{is_http_retryable, retry_with_backoff, RetryConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const STORE_TIMEOUT: Duration = Duration::from_secs(10);
pub const CHAT_TABLE: &str = "chat_history";
pub const PHYSIOGNOMY_TABLE: &str = "physiognomy_results";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("store returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network(e) => e.is_timeout() || e.is_connect(),
            StoreError::Api { status, .. } => is_http_retryable(*status),
        }
    }
}

/// One face reading, as kept by the remote store.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PhysiognomyRecord {
    pub features: PhysiognomyFeatures,
    pub response: String,
    pub emotion: Emotion,
}

/// Append-only remote tables. Callers treat every write as best effort.
pub trait RemoteStore: Send + Sync {
    fn insert_turn(&self, turn: ChatTurn) -> BoxFuture<'_, Result<(), StoreError>>;
    fn insert_physiognomy(&self, record: PhysiognomyRecord) -> BoxFuture<'_, Result<(), StoreError>>;
}

#[derive(Serialize)]
struct ChatRow<'a> {
    role: &'static str,
    content: &'a str,
    emotion: Option<&'static str>,
}

impl<'a> From<&'a ChatTurn> for ChatRow<'a> {
    fn from(turn: &'a ChatTurn) -> Self {
        Self {
            role: turn.role.as_str(),
            content: &turn.content,
            emotion: turn.emotion.map(|e| e.as_str()),
        }
    }
}

/// PostgREST endpoint of a Supabase project, authenticated with the anon key.
#[derive(Clone)]
pub struct SupabaseStore {
    client: Client,
    config: SupabaseConfig,
    retry: RetryConfig,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(STORE_TIMEOUT).build()?;
        Ok(Self {
            client,
            config,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{table}",
            self.config.url.as_str().trim_end_matches('/')
        )
    }

    async fn insert<T: Serialize + Sync>(&self, table: &str, row: &T) -> Result<(), StoreError> {
        let url = self.table_url(table);
        let url = url.as_str();
        let key = self.config.anon_key.expose();
        let client = &self.client;
        retry_with_backoff(
            &self.retry,
            move || async move {
                let response = client
                    .post(url)
                    .header("apikey", key)
                    .bearer_auth(key)
                    .header("Prefer", "return=minimal")
                    .json(row)
                    .send()
                    .await?;
                if response.status().is_success() {
                    return Ok(());
                }
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Api { status, body })
            },
            StoreError::is_retryable,
        )
        .await
    }
}

impl RemoteStore for SupabaseStore {
    fn insert_turn(&self, turn: ChatTurn) -> BoxFuture<'_, Result<(), StoreError>> {
        async move { self.insert(CHAT_TABLE, &ChatRow::from(&turn)).await }.boxed()
    }

    fn insert_physiognomy(&self, record: PhysiognomyRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        async move { self.insert(PHYSIOGNOMY_TABLE, &record).await }.boxed()
    }
}
