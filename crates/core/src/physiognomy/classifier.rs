use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnimalMatch {
    #[serde(alias = "className")]
    pub label: String,
    pub probability: f32,
}

impl fmt::Display for AnimalMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.0}%)", self.label, self.probability * 100.0)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("classifier returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("classifier returned no predictions")]
    Empty,
}

/// Animal-face image classifier: one image in, ranked predictions out.
pub trait AnimalClassifier: Send + Sync {
    fn classify(&self, image: Bytes) -> BoxFuture<'_, Result<Vec<AnimalMatch>, ClassifierError>>;
}

/// Highest probability first.
pub fn rank(mut predictions: Vec<AnimalMatch>) -> Vec<AnimalMatch> {
    predictions.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    predictions
}

/// Posts the raw image to a model server that answers with a JSON array of
/// `{ "className": .., "probability": .. }` (the Teachable Machine export
/// format).
#[derive(Clone)]
pub struct HttpImageClassifier {
    client: Client,
    endpoint: Url,
}

impl HttpImageClassifier {
    pub fn new(endpoint: Url) -> Result<Self, ClassifierError> {
        let client = Client::builder().timeout(CLASSIFY_TIMEOUT).build()?;
        Ok(Self { client, endpoint })
    }
}

impl AnimalClassifier for HttpImageClassifier {
    fn classify(&self, image: Bytes) -> BoxFuture<'_, Result<Vec<AnimalMatch>, ClassifierError>> {
        async move {
            let response = self
                .client
                .post(self.endpoint.clone())
                .header("Content-Type", "application/octet-stream")
                .body(image)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(ClassifierError::Api { status, body });
            }

            let predictions: Vec<AnimalMatch> = response.json().await?;
            if predictions.is_empty() {
                return Err(ClassifierError::Empty);
            }
            Ok(rank(predictions))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_sorts_descending() {
        let ranked = rank(vec![
            AnimalMatch {
                label: "dog".into(),
                probability: 0.2,
            },
            AnimalMatch {
                label: "cat".into(),
                probability: 0.7,
            },
            AnimalMatch {
                label: "fox".into(),
                probability: 0.1,
            },
        ]);
        let labels: Vec<_> = ranked.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["cat", "dog", "fox"]);
    }

    #[test]
    fn parses_teachable_machine_predictions() {
        let json = r#"[{"className": "고양이상", "probability": 0.91},
                       {"className": "강아지상", "probability": 0.09}]"#;
        let parsed: Vec<AnimalMatch> = serde_json::from_str(json).expect("valid json");
        assert_eq!(parsed[0].label, "고양이상");
        assert_eq!(parsed[0].to_string(), "고양이상 (91%)");
    }
}
