#[cfg(test)]
mod tests;

use std::sync::Arc;

use tracing::{info, warn};

use crate::database::VectorCollection;
use crate::embeddings::EmbeddingProvider;
use crate::{KbError, Result};

/// What the guard had to do to make the collection usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// The collection dimension already matches the provider.
    Verified,
    /// The collection was dropped and recreated at the provider's dimension.
    Rebuilt,
}

/// Verifies that the collection's vector dimension matches the configured
/// embedding provider before any write goes through.
///
/// A mismatched non-empty collection is only rebuilt when the caller holds a
/// snapshot it can re-ingest from; otherwise the mismatch is surfaced as
/// `RebuildFailed` and the stored data is left untouched.
pub struct DimensionGuard {
    collection: Arc<VectorCollection>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl DimensionGuard {
    #[inline]
    pub fn new(collection: Arc<VectorCollection>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            collection,
            provider,
        }
    }

    /// Check the collection dimension against the provider, rebuilding the
    /// collection when that can be done without losing data the caller cannot
    /// restore.
    #[inline]
    pub async fn ensure_dimension(&self, snapshot_available: bool) -> Result<GuardOutcome> {
        let provider_dim = self.provider.dimension()?;

        let Some(collection_dim) = self.collection.dimension().await? else {
            self.collection.drop_and_recreate(provider_dim).await?;
            return Ok(GuardOutcome::Rebuilt);
        };

        if collection_dim == provider_dim {
            return Ok(GuardOutcome::Verified);
        }

        // An empty collection carries no data, so a rebuild loses nothing.
        if self.collection.count().await? == 0 {
            info!(
                "Empty collection has stale dimension {}, recreating at {}",
                collection_dim, provider_dim
            );
            self.collection.drop_and_recreate(provider_dim).await?;
            return Ok(GuardOutcome::Rebuilt);
        }

        if !snapshot_available {
            return Err(KbError::RebuildFailed(format!(
                "collection dimension is {} but provider produces {}, and no snapshot is available to re-ingest from",
                collection_dim, provider_dim
            )));
        }

        warn!(
            "Collection dimension {} does not match provider dimension {}, rebuilding",
            collection_dim, provider_dim
        );
        self.collection.drop_and_recreate(provider_dim).await?;
        Ok(GuardOutcome::Rebuilt)
    }
}
