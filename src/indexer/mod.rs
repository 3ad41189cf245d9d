// Indexer module
// Coordinates chunking, embedding, and full-corpus reindexing

#[cfg(test)]
mod tests;

pub mod guard;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::{ChunkMetadata, ChunkRecord, StoredChunk, VectorCollection};
use crate::embeddings::EmbeddingProvider;
use crate::embeddings::chunking::{ChunkParams, split_text};
use crate::loader::load_document;
use crate::{KbError, Result};

pub use guard::{DimensionGuard, GuardOutcome};

/// Cooperative cancellation flag for long-running reindex runs.
///
/// Cancellation is checked between sources, so a cancelled run stops at the
/// next source boundary and reports partial statistics.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Statistics about a reindex run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReindexStats {
    pub total_sources: usize,
    pub reindexed_sources: usize,
    pub failed_sources: Vec<String>,
    pub total_chunks_before: u64,
    pub total_chunks_after: u64,
    pub cancelled: bool,
}

/// Drives ingestion of documents into the collection and the full-corpus
/// reindex flow.
pub struct ReindexCoordinator {
    collection: Arc<VectorCollection>,
    provider: Arc<dyn EmbeddingProvider>,
    chunk_params: ChunkParams,
    upload_dir: PathBuf,
}

impl ReindexCoordinator {
    #[inline]
    pub fn new(
        collection: Arc<VectorCollection>,
        provider: Arc<dyn EmbeddingProvider>,
        chunk_params: ChunkParams,
        upload_dir: PathBuf,
    ) -> Result<Self> {
        chunk_params.validate()?;
        Ok(Self {
            collection,
            provider,
            chunk_params,
            upload_dir,
        })
    }

    /// Load a file from disk and index it under `source`, replacing any chunks
    /// previously stored for that source. Returns the number of chunks stored.
    #[inline]
    pub async fn index_file(&self, source: &str, path: &Path) -> Result<usize> {
        let text = load_document(path)?;
        self.index_chunks(source, &text, Some(path)).await
    }

    /// Index raw text under `source`, replacing any chunks previously stored
    /// for that source. Returns the number of chunks stored.
    #[inline]
    pub async fn index_text(&self, source: &str, text: &str) -> Result<usize> {
        self.index_chunks(source, text, None).await
    }

    async fn index_chunks(
        &self,
        source: &str,
        text: &str,
        file_path: Option<&Path>,
    ) -> Result<usize> {
        if source.trim().is_empty() {
            return Err(KbError::Validation(
                "source name cannot be empty".to_string(),
            ));
        }

        let chunks = split_text(text, &self.chunk_params)?;
        if chunks.is_empty() {
            debug!("Source {} produced no chunks", source);
            self.collection.delete_by_source(source).await?;
            return Ok(0);
        }

        let vectors = self.provider.embed_batch(&chunks)?;
        let created_at = Utc::now().to_rfc3339();

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (chunk_text, vector))| ChunkRecord {
                id: Uuid::new_v4().to_string(),
                vector,
                text: chunk_text,
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    chunk_index: index as u32,
                    file_path: file_path.map(|p| p.display().to_string()),
                },
                created_at: created_at.clone(),
            })
            .collect();

        // Old chunks are only removed once the new ones are ready, so a load
        // or embedding failure leaves the stored data untouched.
        self.collection.delete_by_source(source).await?;
        self.collection.upsert(&records).await?;

        debug!("Indexed {} chunks for source: {}", records.len(), source);
        Ok(records.len())
    }

    /// Rebuild the whole collection from the original source files.
    ///
    /// Takes an in-memory snapshot first, verifies the collection dimension
    /// against the embedding provider (rebuilding the collection if the
    /// provider changed), then re-chunks and re-embeds every source. A source
    /// whose file cannot be found, loaded, or embedded is recorded in
    /// `failed_sources`; it never aborts the rest of the run.
    #[inline]
    pub async fn reindex_all(&self, cancel: &CancelToken) -> Result<ReindexStats> {
        let total_chunks_before = self.collection.count().await?;
        info!(
            "Starting full reindex of {} stored chunks",
            total_chunks_before
        );

        let snapshot = self.collection.get_all().await?;

        let guard = DimensionGuard::new(Arc::clone(&self.collection), Arc::clone(&self.provider));
        if guard.ensure_dimension(true).await? == GuardOutcome::Rebuilt {
            info!("Collection was rebuilt before reindexing");
        }

        let (order, groups) = group_by_source(snapshot);

        let mut stats = ReindexStats {
            total_sources: order.len(),
            total_chunks_before,
            ..ReindexStats::default()
        };

        for source in order {
            if cancel.is_cancelled() {
                warn!("Reindex cancelled before source: {}", source);
                stats.cancelled = true;
                break;
            }

            match self.reindex_source(&source, &groups[&source]).await {
                Ok(count) => {
                    info!("Reindexed source {} into {} chunks", source, count);
                    stats.reindexed_sources += 1;
                }
                Err(e) => {
                    error!("Failed to reindex source {}: {}", source, e);
                    stats.failed_sources.push(source);
                }
            }
        }

        stats.total_chunks_after = self.collection.count().await?;
        info!(
            "Reindex finished: {}/{} sources, {} chunks ({} failed)",
            stats.reindexed_sources,
            stats.total_sources,
            stats.total_chunks_after,
            stats.failed_sources.len()
        );
        Ok(stats)
    }

    async fn reindex_source(&self, source: &str, chunks: &[StoredChunk]) -> Result<usize> {
        let path = self.resolve_source_path(source, chunks)?;
        self.index_file(source, &path).await
    }

    /// Find a readable file for `source`: the path recorded at index time if
    /// it still exists, otherwise a file of the same name in the upload
    /// directory.
    fn resolve_source_path(&self, source: &str, chunks: &[StoredChunk]) -> Result<PathBuf> {
        for chunk in chunks {
            if let Some(file_path) = &chunk.metadata.file_path {
                let path = PathBuf::from(file_path);
                if path.exists() {
                    return Ok(path);
                }
            }
        }

        let fallback = self.upload_dir.join(source);
        if fallback.exists() {
            return Ok(fallback);
        }

        Err(KbError::SourceNotFound(format!(
            "{} (no readable file on disk)",
            source
        )))
    }
}

/// Group chunks by source, preserving the order sources are first seen.
fn group_by_source(chunks: Vec<StoredChunk>) -> (Vec<String>, HashMap<String, Vec<StoredChunk>>) {
    let mut order = Vec::new();
    let mut groups: HashMap<String, Vec<StoredChunk>> = HashMap::new();

    for chunk in chunks {
        let source = chunk.metadata.source.clone();
        if !groups.contains_key(&source) {
            order.push(source.clone());
        }
        groups.entry(source).or_default().push(chunk);
    }

    (order, groups)
}
