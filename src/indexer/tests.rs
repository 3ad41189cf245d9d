use super::*;
use crate::config::{Config, EmbeddingConfig};
use crate::database::VectorCollection;
use crate::embeddings::LocalEmbedder;
use std::fs;
use tempfile::TempDir;

fn make_provider(dimension: u32) -> Arc<dyn EmbeddingProvider> {
    let embedding = EmbeddingConfig {
        dimension,
        ..EmbeddingConfig::default()
    };
    Arc::new(LocalEmbedder::new(&embedding).expect("should create embedder"))
}

async fn setup() -> (Arc<VectorCollection>, PathBuf, TempDir) {
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

    let upload_dir = temp_dir.path().join("uploads");
    fs::create_dir_all(&upload_dir).expect("should create upload dir");

    (collection, upload_dir, temp_dir)
}

fn make_coordinator(
    collection: &Arc<VectorCollection>,
    provider: Arc<dyn EmbeddingProvider>,
    upload_dir: &Path,
) -> ReindexCoordinator {
    ReindexCoordinator::new(
        Arc::clone(collection),
        provider,
        ChunkParams {
            chunk_size: 200,
            chunk_overlap: 20,
        },
        upload_dir.to_path_buf(),
    )
    .expect("should create coordinator")
}

fn write_source(dir: &Path, name: &str, paragraphs: usize) -> PathBuf {
    let text: String = (0..paragraphs)
        .map(|i| format!("Paragraph {} about opportunity cost and markets.\n\n", i))
        .collect();
    let path = dir.join(name);
    fs::write(&path, text).expect("should write source file");
    path
}

#[tokio::test]
async fn index_file_stores_chunks_with_metadata() {
    let (collection, upload_dir, _temp_dir) = setup().await;
    let coordinator = make_coordinator(&collection, make_provider(64), &upload_dir);

    let path = write_source(&upload_dir, "notes.txt", 10);
    let stored = coordinator
        .index_file("notes.txt", &path)
        .await
        .expect("should index file");

    assert!(stored > 1);
    assert_eq!(collection.count().await.expect("should count"), stored as u64);

    let chunks = collection.get_all().await.expect("should fetch chunks");
    assert!(chunks.iter().all(|c| c.metadata.source == "notes.txt"));
    let recorded = path.display().to_string();
    assert!(
        chunks
            .iter()
            .all(|c| c.metadata.file_path.as_deref() == Some(recorded.as_str()))
    );

    let mut indices: Vec<u32> = chunks.iter().map(|c| c.metadata.chunk_index).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..stored as u32).collect::<Vec<_>>());
}

#[tokio::test]
async fn index_text_replaces_previous_chunks() {
    let (collection, upload_dir, _temp_dir) = setup().await;
    let coordinator = make_coordinator(&collection, make_provider(64), &upload_dir);

    coordinator
        .index_text("memo", "first version of the memo text")
        .await
        .expect("should index text");
    coordinator
        .index_text("memo", "second version, completely rewritten")
        .await
        .expect("should reindex text");

    let chunks = collection.get_all().await.expect("should fetch chunks");
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].text.contains("second version"));
}

#[tokio::test]
async fn index_rejects_empty_source_name() {
    let (collection, upload_dir, _temp_dir) = setup().await;
    let coordinator = make_coordinator(&collection, make_provider(64), &upload_dir);

    assert!(matches!(
        coordinator.index_text("  ", "some text").await,
        Err(KbError::Validation(_))
    ));
}

#[tokio::test]
async fn reindex_of_empty_collection_reports_zero_sources() {
    let (collection, upload_dir, _temp_dir) = setup().await;
    let coordinator = make_coordinator(&collection, make_provider(64), &upload_dir);

    let stats = coordinator
        .reindex_all(&CancelToken::new())
        .await
        .expect("should reindex");

    assert_eq!(stats.total_sources, 0);
    assert_eq!(stats.reindexed_sources, 0);
    assert!(stats.failed_sources.is_empty());
    assert_eq!(stats.total_chunks_after, 0);
}

#[tokio::test]
async fn reindex_is_idempotent_for_unchanged_sources() {
    let (collection, upload_dir, _temp_dir) = setup().await;
    let coordinator = make_coordinator(&collection, make_provider(64), &upload_dir);

    let alpha = write_source(&upload_dir, "alpha.txt", 8);
    let beta = write_source(&upload_dir, "beta.txt", 4);
    coordinator
        .index_file("alpha.txt", &alpha)
        .await
        .expect("should index alpha");
    coordinator
        .index_file("beta.txt", &beta)
        .await
        .expect("should index beta");

    let before = collection.count().await.expect("should count");
    let stats = coordinator
        .reindex_all(&CancelToken::new())
        .await
        .expect("should reindex");

    assert_eq!(stats.total_sources, 2);
    assert_eq!(stats.reindexed_sources, 2);
    assert!(stats.failed_sources.is_empty());
    assert_eq!(stats.total_chunks_before, before);
    assert_eq!(stats.total_chunks_after, before);
    assert!(!stats.cancelled);
}

#[tokio::test]
async fn reindex_isolates_a_missing_source_file() {
    let (collection, upload_dir, _temp_dir) = setup().await;
    let coordinator = make_coordinator(&collection, make_provider(64), &upload_dir);

    let alpha = write_source(&upload_dir, "alpha.txt", 6);
    let beta = write_source(&upload_dir, "beta.txt", 6);
    coordinator
        .index_file("alpha.txt", &alpha)
        .await
        .expect("should index alpha");
    let beta_chunks = coordinator
        .index_file("beta.txt", &beta)
        .await
        .expect("should index beta");

    fs::remove_file(&beta).expect("should remove beta");

    let stats = coordinator
        .reindex_all(&CancelToken::new())
        .await
        .expect("should reindex");

    assert_eq!(stats.total_sources, 2);
    assert_eq!(stats.reindexed_sources, 1);
    assert_eq!(stats.failed_sources, vec!["beta.txt".to_string()]);

    // The failed source keeps its previously stored chunks.
    let remaining = collection.get_all().await.expect("should fetch chunks");
    let beta_remaining = remaining
        .iter()
        .filter(|c| c.metadata.source == "beta.txt")
        .count();
    assert_eq!(beta_remaining, beta_chunks);
}

#[tokio::test]
async fn reindex_falls_back_to_the_upload_directory() {
    let (collection, upload_dir, _temp_dir) = setup().await;
    let coordinator = make_coordinator(&collection, make_provider(64), &upload_dir);

    // Indexed as raw text, so no file path was recorded.
    coordinator
        .index_text("recovered.txt", "original in-memory text")
        .await
        .expect("should index text");
    write_source(&upload_dir, "recovered.txt", 3);

    let stats = coordinator
        .reindex_all(&CancelToken::new())
        .await
        .expect("should reindex");

    assert_eq!(stats.reindexed_sources, 1);
    assert!(stats.failed_sources.is_empty());

    let chunks = collection.get_all().await.expect("should fetch chunks");
    assert!(chunks.iter().any(|c| c.text.contains("Paragraph 0")));
}

#[tokio::test]
async fn reindex_rebuilds_when_the_provider_dimension_changes() {
    let (collection, upload_dir, _temp_dir) = setup().await;

    let small = make_coordinator(&collection, make_provider(64), &upload_dir);
    let path = write_source(&upload_dir, "notes.txt", 6);
    small
        .index_file("notes.txt", &path)
        .await
        .expect("should index file");
    assert_eq!(
        collection.dimension().await.expect("should get dimension"),
        Some(64)
    );

    let large = make_coordinator(&collection, make_provider(128), &upload_dir);
    let stats = large
        .reindex_all(&CancelToken::new())
        .await
        .expect("should reindex");

    assert_eq!(stats.reindexed_sources, 1);
    assert!(stats.failed_sources.is_empty());
    assert_eq!(
        collection.dimension().await.expect("should get dimension"),
        Some(128)
    );
    assert!(stats.total_chunks_after > 0);
}

#[tokio::test]
async fn cancelled_reindex_stops_at_a_source_boundary() {
    let (collection, upload_dir, _temp_dir) = setup().await;
    let coordinator = make_coordinator(&collection, make_provider(64), &upload_dir);

    let alpha = write_source(&upload_dir, "alpha.txt", 4);
    coordinator
        .index_file("alpha.txt", &alpha)
        .await
        .expect("should index alpha");

    let cancel = CancelToken::new();
    cancel.cancel();

    let stats = coordinator
        .reindex_all(&cancel)
        .await
        .expect("should reindex");

    assert!(stats.cancelled);
    assert_eq!(stats.reindexed_sources, 0);
    assert_eq!(stats.total_sources, 1);
}
