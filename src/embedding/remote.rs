//! Remote HTTP embedding provider.
//!
//! Talks to an OpenAI-compatible `/embeddings` endpoint, which also covers
//! custom self-hosted servers exposing the same shape. Network failures and
//! 5xx responses surface as [`EmbedError::ProviderUnavailable`] so the index
//! manager retries them with backoff; 4xx responses are treated as
//! non-retryable input errors.

use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use super::{l2_normalize, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

pub struct RemoteEmbeddingProvider {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

impl RemoteEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("remote embedding provider requires an endpoint"))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}/embeddings", self.endpoint);
        let mut req = self.client.post(&url).json(&serde_json::json!({
            "model": self.model,
            "input": texts,
        }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .map_err(|e| EmbedError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().unwrap_or_default();
            return Err(EmbedError::InvalidInput(format!("{status}: {body}")));
        }
        if !status.is_success() {
            return Err(EmbedError::ProviderUnavailable(format!(
                "endpoint returned {status}"
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .map_err(|e| EmbedError::ProviderUnavailable(format!("malformed response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbedError::ProviderUnavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        let mut vectors = Vec::with_capacity(parsed.data.len());
        for item in parsed.data {
            if item.embedding.len() != self.dimensions {
                return Err(EmbedError::ProviderUnavailable(format!(
                    "endpoint returned {}-dim vector, {} configured",
                    item.embedding.len(),
                    self.dimensions
                )));
            }
            vectors.push(l2_normalize(&item.embedding));
        }
        Ok(vectors)
    }
}

impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let results = self.embed_batch(&[text])?;
        Ok(results.into_iter().next().expect("batch had one input"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if let Some(empty) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(EmbedError::InvalidInput(format!(
                "text at position {empty} is empty"
            )));
        }
        self.request(texts)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
