
use std::hash::Hasher;
use std::sync::OnceLock;

use tracing::{debug, info};
use twox_hash::XxHash64;

use super::{DIMENSION_SENTINEL, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::{KbError, Result};

/// In-process embedding provider with no network dependency.
///
/// Produces deterministic vectors via token feature hashing: every token is
/// hashed into one of `dimension` buckets with a weight derived from the hash,
/// and the result is L2-normalized. The model identifier seeds the hash, so
/// changing the configured model changes the vector space (and its apparent
/// "model") without any code change.
pub struct LocalEmbedder {
    model: String,
    dimension: usize,
    seed: u64,
    dim_cache: OnceLock<usize>,
}

impl LocalEmbedder {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if config.model.trim().is_empty() {
            return Err(KbError::Config(
                "local embedding model identifier cannot be empty".to_string(),
            ));
        }

        let mut hasher = XxHash64::with_seed(0);
        hasher.write(config.model.as_bytes());
        let seed = hasher.finish();

        info!(
            "Local embedder initialized (model={}, dimension={}, device={})",
            config.model, config.dimension, config.device
        );

        Ok(Self {
            model: config.model.clone(),
            dimension: config.dimension as usize,
            seed,
            dim_cache: OnceLock::new(),
        })
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];

        for (position, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(self.seed);
            hasher.write(token.to_lowercase().as_bytes());
            let hash = hasher.finish();

            let bucket = (hash as usize) % self.dimension;
            let weight = ((hash >> 32) as u32) as f32 / u32::MAX as f32;
            vector[bucket] += weight + (position % 3) as f32 * 0.01;
        }

        let norm = vector
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt()
            .max(1e-6);
        for value in &mut vector {
            *value /= norm;
        }

        vector
    }
}

impl EmbeddingProvider for LocalEmbedder {
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!("Embedding {} texts locally", texts.len());
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    #[inline]
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
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
