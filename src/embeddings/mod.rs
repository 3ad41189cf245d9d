// Embedding module
// Text chunking and conversion of text into fixed-dimension vectors

pub mod chunking;
pub mod local;
pub mod remote;

use std::sync::Arc;

use crate::Result;
use crate::config::{Config, ProviderKind};

pub use local::LocalEmbedder;
pub use remote::RemoteEmbedder;

/// Fixed probe text used to discover a provider's output dimension.
pub(crate) const DIMENSION_SENTINEL: &str = "dimension probe";

/// A source of fixed-dimension embedding vectors.
///
/// Implementations must be order-preserving and one-to-one in `embed_batch`,
/// and `dimension` must be stable for the lifetime of the provider instance.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>>;

    /// Output vector dimension, computed lazily by embedding a sentinel
    /// string once and caching the resulting length.
    fn dimension(&self) -> Result<usize>;
}

/// Construct the embedding provider selected by the configuration.
#[inline]
pub fn build_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding.provider {
        ProviderKind::Local => Ok(Arc::new(LocalEmbedder::new(&config.embedding)?)),
        ProviderKind::Remote => Ok(Arc::new(RemoteEmbedder::new(&config.embedding)?)),
    }
}
