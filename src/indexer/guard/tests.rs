use super::*;
use crate::config::{Config, EmbeddingConfig};
use crate::database::{ChunkMetadata, ChunkRecord};
use crate::embeddings::LocalEmbedder;
use tempfile::TempDir;

async fn setup(dimension: u32) -> (Arc<VectorCollection>, Arc<dyn EmbeddingProvider>, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };

    let collection = Arc::new(
        VectorCollection::open(&config)
            .await
            .expect("should open collection"),
    );

    let embedding = EmbeddingConfig {
        dimension,
        ..EmbeddingConfig::default()
    };
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::new(LocalEmbedder::new(&embedding).expect("should create embedder"));

    (collection, provider, temp_dir)
}

fn record_with_dimension(id: &str, dimension: usize) -> ChunkRecord {
    ChunkRecord {
        id: id.to_string(),
        vector: vec![0.5; dimension],
        text: format!("chunk {}", id),
        metadata: ChunkMetadata {
            source: "notes.txt".to_string(),
            chunk_index: 0,
            file_path: None,
        },
        created_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

#[tokio::test]
async fn missing_table_is_created_at_provider_dimension() {
    let (collection, provider, _temp_dir) = setup(64).await;
    let guard = DimensionGuard::new(Arc::clone(&collection), provider);

    let outcome = guard
        .ensure_dimension(false)
        .await
        .expect("guard should succeed");

    assert_eq!(outcome, GuardOutcome::Rebuilt);
    assert_eq!(
        collection.dimension().await.expect("should get dimension"),
        Some(64)
    );
}

#[tokio::test]
async fn matching_dimension_is_verified() {
    let (collection, provider, _temp_dir) = setup(64).await;
    collection
        .upsert(&[record_with_dimension("a", 64)])
        .await
        .expect("should store chunk");

    let guard = DimensionGuard::new(Arc::clone(&collection), provider);
    let outcome = guard
        .ensure_dimension(false)
        .await
        .expect("guard should succeed");

    assert_eq!(outcome, GuardOutcome::Verified);
    assert_eq!(collection.count().await.expect("should count"), 1);
}

#[tokio::test]
async fn running_the_guard_twice_changes_nothing() {
    let (collection, provider, _temp_dir) = setup(64).await;
    collection
        .upsert(&[record_with_dimension("a", 64)])
        .await
        .expect("should store chunk");

    let guard = DimensionGuard::new(Arc::clone(&collection), provider);
    for _ in 0..2 {
        let outcome = guard
            .ensure_dimension(false)
            .await
            .expect("guard should succeed");
        assert_eq!(outcome, GuardOutcome::Verified);
        assert_eq!(collection.count().await.expect("should count"), 1);
    }
}

#[tokio::test]
async fn empty_collection_is_rebuilt_without_snapshot() {
    let (collection, provider, _temp_dir) = setup(64).await;
    collection
        .drop_and_recreate(128)
        .await
        .expect("should create collection");

    let guard = DimensionGuard::new(Arc::clone(&collection), provider);
    let outcome = guard
        .ensure_dimension(false)
        .await
        .expect("guard should succeed");

    assert_eq!(outcome, GuardOutcome::Rebuilt);
    assert_eq!(
        collection.dimension().await.expect("should get dimension"),
        Some(64)
    );
}

#[tokio::test]
async fn mismatch_with_snapshot_rebuilds() {
    let (collection, provider, _temp_dir) = setup(64).await;
    collection
        .upsert(&[record_with_dimension("a", 128)])
        .await
        .expect("should store chunk");

    let guard = DimensionGuard::new(Arc::clone(&collection), provider);
    let outcome = guard
        .ensure_dimension(true)
        .await
        .expect("guard should succeed");

    assert_eq!(outcome, GuardOutcome::Rebuilt);
    assert_eq!(
        collection.dimension().await.expect("should get dimension"),
        Some(64)
    );
    assert_eq!(collection.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn mismatch_without_snapshot_fails_and_keeps_data() {
    let (collection, provider, _temp_dir) = setup(64).await;
    collection
        .upsert(&[record_with_dimension("a", 128)])
        .await
        .expect("should store chunk");

    let guard = DimensionGuard::new(Arc::clone(&collection), provider);
    let result = guard.ensure_dimension(false).await;

    assert!(matches!(result, Err(KbError::RebuildFailed(_))));
    assert_eq!(collection.count().await.expect("should count"), 1);
    assert_eq!(
        collection.dimension().await.expect("should get dimension"),
        Some(128)
    );
}
