
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::{DIMENSION_SENTINEL, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::{KbError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Network-backed embedding provider speaking the OpenAI-compatible
/// `/embeddings` API.
///
/// Failures are surfaced as `KbError::Embedding` and are not retried here;
/// callers own the retry/deadline policy.
pub struct RemoteEmbedder {
    base_url: Url,
    model: String,
    api_key: String,
    batch_size: usize,
    agent: ureq::Agent,
    dim_cache: OnceLock<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
    index: usize,
}

impl RemoteEmbedder {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url)
            .map_err(|_| KbError::Config(format!("invalid embedding base URL: {}", config.base_url)))?;
        // A trailing slash keeps Url::join from replacing the last path segment.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| {
                KbError::Config(format!(
                    "no API key configured for remote embeddings (set api_key or the {} environment variable)",
                    config.api_key_env
                ))
            })?;

        if config.model.trim().is_empty() {
            return Err(KbError::Config(
                "remote embedding model identifier cannot be empty".to_string(),
            ));
        }

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            api_key,
            batch_size: config.batch_size as usize,
            agent,
            dim_cache: OnceLock::new(),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let url = self
            .base_url
            .join("embeddings")
            .map_err(|e| KbError::Config(format!("failed to build embeddings URL: {}", e)))?;

        let request_json = serde_json::to_string(&request)
            .map_err(|e| KbError::Embedding(format!("failed to serialize request: {}", e)))?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| {
                warn!("Embedding request to {} failed: {}", url, e);
                KbError::Embedding(format!("embedding request failed: {}", e))
            })?;

        let response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| KbError::Embedding(format!("failed to parse embedding response: {}", e)))?;

        if response.data.len() != texts.len() {
            return Err(KbError::Embedding(format!(
                "mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|entry| entry.index);
        Ok(data.into_iter().map(|entry| entry.embedding).collect())
    }
}

impl EmbeddingProvider for RemoteEmbedder {
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts via {}", texts.len(), self.base_url);

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            vectors.extend(self.embed_single_batch(batch)?);
        }
        Ok(vectors)
    }

    #[inline]
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_single_batch(std::slice::from_ref(&text.to_string()))?;
        vectors
            .pop()
            .ok_or_else(|| KbError::Embedding("empty embedding response".to_string()))
    }

    #[inline]
    fn dimension(&self) -> Result<usize> {
        if let Some(dim) = self.dim_cache.get() {
            return Ok(*dim);
        }
        let vector = self.embed_one(DIMENSION_SENTINEL)?;
        Ok(*self.dim_cache.get_or_init(|| vector.len()))
    }
}
