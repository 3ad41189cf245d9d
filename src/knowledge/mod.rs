// Knowledge base facade
// Single entry point tying together loading, chunking, embedding, storage,
// and search


use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::config::Config;
use crate::database::VectorCollection;
use crate::embeddings::chunking::ChunkParams;
use crate::embeddings::{EmbeddingProvider, build_provider};
use crate::indexer::{CancelToken, DimensionGuard, ReindexCoordinator, ReindexStats};
use crate::search::{SearchEngine, SearchHit};
use crate::{KbError, Result};

/// Summary of the collection behind this knowledge base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    /// Number of stored chunks.
    pub document_count: u64,
}

/// High-level interface over the knowledge base.
///
/// Writes (adding, deleting, reindexing) are serialized through an internal
/// lock so only one mutation runs at a time. Searches never take the lock.
pub struct KnowledgeBase {
    config: Config,
    collection: Arc<VectorCollection>,
    provider: Arc<dyn EmbeddingProvider>,
    coordinator: ReindexCoordinator,
    engine: SearchEngine,
    write_lock: Mutex<()>,
}

impl KnowledgeBase {
    /// Open the knowledge base described by `config`, constructing the
    /// embedding provider the configuration selects.
    #[inline]
    pub async fn open(config: Config) -> Result<Self> {
        let provider = build_provider(&config)?;
        Self::open_with_provider(config, provider).await
    }

    /// Open the knowledge base with an explicitly supplied embedding provider.
    #[inline]
    pub async fn open_with_provider(
        config: Config,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| KbError::Config(e.to_string()))?;

        let collection = Arc::new(VectorCollection::open(&config).await?);

        let coordinator = ReindexCoordinator::new(
            Arc::clone(&collection),
            Arc::clone(&provider),
            config.chunking,
            config.upload_dir_path(),
        )?;
        let engine = SearchEngine::new(Arc::clone(&collection), Arc::clone(&provider));

        info!(
            "Knowledge base opened (collection={})",
            config.storage.collection_name
        );

        Ok(Self {
            config,
            collection,
            provider,
            coordinator,
            engine,
            write_lock: Mutex::new(()),
        })
    }

    /// Chunk, embed, and store a document from disk under its file name.
    /// Returns the number of chunks stored.
    #[inline]
    pub async fn add_document(&self, path: &Path) -> Result<usize> {
        let source = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                KbError::Validation(format!("invalid document path: {}", path.display()))
            })?
            .to_string();

        let _lock = self.write_lock.lock().await;
        self.guard().ensure_dimension(false).await?;
        self.coordinator.index_file(&source, path).await
    }

    /// Chunk, embed, and store raw text under the given source name.
    /// Returns the number of chunks stored.
    #[inline]
    pub async fn add_text(&self, source: &str, text: &str) -> Result<usize> {
        let _lock = self.write_lock.lock().await;
        self.guard().ensure_dimension(false).await?;
        self.coordinator.index_text(source, text).await
    }

    /// Return the text of the `k` chunks most similar to the query.
    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<String>> {
        self.engine.search(query, k).await
    }

    /// Return the `k` chunks most similar to the query with their scores.
    #[inline]
    pub async fn search_with_scores(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.engine.search_with_scores(query, k).await
    }

    /// Rebuild the whole collection from source files using the configured
    /// chunking parameters.
    #[inline]
    pub async fn reindex_all(&self, cancel: &CancelToken) -> Result<ReindexStats> {
        let _lock = self.write_lock.lock().await;
        self.coordinator.reindex_all(cancel).await
    }

    /// Rebuild the whole collection with one-off chunking parameters, leaving
    /// the configured defaults untouched.
    #[inline]
    pub async fn reindex_with(
        &self,
        params: ChunkParams,
        cancel: &CancelToken,
    ) -> Result<ReindexStats> {
        let _lock = self.write_lock.lock().await;
        let coordinator = ReindexCoordinator::new(
            Arc::clone(&self.collection),
            Arc::clone(&self.provider),
            params,
            self.config.upload_dir_path(),
        )?;
        coordinator.reindex_all(cancel).await
    }

    /// Remove every chunk stored for `source`, returning how many were
    /// removed. Removing an unknown source removes nothing.
    #[inline]
    pub async fn delete_source(&self, source: &str) -> Result<u64> {
        let _lock = self.write_lock.lock().await;
        self.collection.delete_by_source(source).await
    }

    /// Distinct source names in the collection, in first-indexed order.
    #[inline]
    pub async fn list_sources(&self) -> Result<Vec<String>> {
        self.collection.sources().await
    }

    /// Name and chunk count of the underlying collection.
    #[inline]
    pub async fn collection_info(&self) -> Result<CollectionInfo> {
        Ok(CollectionInfo {
            name: self.config.storage.collection_name.clone(),
            document_count: self.collection.count().await?,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn guard(&self) -> DimensionGuard {
        DimensionGuard::new(Arc::clone(&self.collection), Arc::clone(&self.provider))
    }
}
