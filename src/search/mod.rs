// Search module
// Similarity search over the indexed knowledge base


use std::sync::Arc;

use tracing::debug;

use crate::database::{StoredChunk, VectorCollection};
use crate::embeddings::EmbeddingProvider;
use crate::{KbError, Result};

/// A single search hit: the stored chunk plus its similarity score
/// (higher is closer).
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: StoredChunk,
    pub score: f32,
}

/// Embeds queries and runs nearest-neighbor search against the collection.
pub struct SearchEngine {
    collection: Arc<VectorCollection>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl SearchEngine {
    #[inline]
    pub fn new(collection: Arc<VectorCollection>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            collection,
            provider,
        }
    }

    /// Return the text of the `k` chunks most similar to the query.
    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<String>> {
        let hits = self.search_with_scores(query, k).await?;
        Ok(hits.into_iter().map(|hit| hit.chunk.text).collect())
    }

    /// Return the `k` chunks most similar to the query with their scores.
    ///
    /// An empty or blank query is rejected; searching an empty collection
    /// returns no hits.
    #[inline]
    pub async fn search_with_scores(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(KbError::Validation(
                "search query cannot be empty".to_string(),
            ));
        }
        if k == 0 {
            return Err(KbError::Validation(
                "result count must be at least 1".to_string(),
            ));
        }

        debug!("Searching for {} nearest chunks", k);

        let query_vector = self.provider.embed_one(query)?;
        let results = self.collection.query_nearest(&query_vector, k).await?;

        Ok(results
            .into_iter()
            .map(|(chunk, score)| SearchHit { chunk, score })
            .collect())
    }
}
