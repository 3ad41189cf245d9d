use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::{Config, get_config_dir};
use crate::embeddings::chunking::ChunkParams;
use crate::indexer::CancelToken;
use crate::knowledge::KnowledgeBase;

async fn open_knowledge_base() -> Result<KnowledgeBase> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir).context("Failed to load configuration")?;
    std::fs::create_dir_all(config.upload_dir_path())
        .context("Failed to create upload directory")?;
    let kb = KnowledgeBase::open(config)
        .await
        .context("Failed to open knowledge base")?;
    Ok(kb)
}

/// Print the active configuration as TOML
#[inline]
pub fn show_config() -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir).context("Failed to load configuration")?;

    println!("Configuration directory: {}", config_dir.display());
    println!();
    println!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to serialize configuration")?
    );
    Ok(())
}

/// Write the default configuration file if none exists yet
#[inline]
pub fn init_config() -> Result<()> {
    let config_dir = get_config_dir()?;
    let config_path = config_dir.join("config.toml");

    if config_path.exists() {
        println!("Configuration already exists: {}", config_path.display());
        return Ok(());
    }

    let config = Config {
        base_dir: config_dir,
        ..Config::default()
    };
    config.save().context("Failed to write configuration")?;

    println!("Wrote default configuration: {}", config_path.display());
    Ok(())
}

/// Index a document from disk into the knowledge base
#[inline]
pub async fn add_document(file: &Path) -> Result<()> {
    info!("Adding document: {}", file.display());
    let kb = open_knowledge_base().await?;

    let spinner = new_spinner(format!("Indexing {}", file.display()));
    let result = kb.add_document(file).await;
    spinner.finish_and_clear();

    let chunks = result.with_context(|| format!("Failed to index {}", file.display()))?;
    println!("Indexed {} ({} chunks)", file.display(), chunks);
    Ok(())
}

/// Search the knowledge base and print the best-matching chunks
#[inline]
pub async fn search(query: &str, k: usize, with_scores: bool) -> Result<()> {
    let kb = open_knowledge_base().await?;

    let hits = kb
        .search_with_scores(query, k)
        .await
        .context("Search failed")?;

    if hits.is_empty() {
        println!("No results. The knowledge base may be empty.");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        if with_scores {
            println!(
                "{}. [{}] (score {:.4})",
                rank + 1,
                hit.chunk.metadata.source,
                hit.score
            );
        } else {
            println!("{}. [{}]", rank + 1, hit.chunk.metadata.source);
        }
        println!("{}", hit.chunk.text.trim());
        println!();
    }
    Ok(())
}

/// Rebuild the whole collection from the original source files
#[inline]
pub async fn reindex(chunk_size: Option<usize>, chunk_overlap: Option<usize>) -> Result<()> {
    let kb = open_knowledge_base().await?;

    let defaults = kb.config().chunking;
    let params = ChunkParams::new(
        chunk_size.unwrap_or(defaults.chunk_size),
        chunk_overlap.unwrap_or(defaults.chunk_overlap),
    )?;

    let spinner = new_spinner(format!(
        "Reindexing (chunk_size={}, chunk_overlap={})",
        params.chunk_size, params.chunk_overlap
    ));
    let result = kb.reindex_with(params, &CancelToken::new()).await;
    spinner.finish_and_clear();

    let stats = result.context("Reindex failed")?;

    println!("Reindex complete.");
    println!(
        "  Sources: {}/{} reindexed",
        stats.reindexed_sources, stats.total_sources
    );
    println!(
        "  Chunks: {} -> {}",
        stats.total_chunks_before, stats.total_chunks_after
    );
    if !stats.failed_sources.is_empty() {
        println!("  Failed sources:");
        for source in &stats.failed_sources {
            println!("    - {}", source);
        }
    }
    Ok(())
}

/// Show collection name and chunk count
#[inline]
pub async fn show_info() -> Result<()> {
    let kb = open_knowledge_base().await?;
    let info = kb.collection_info().await.context("Failed to get info")?;

    println!("Collection: {}", info.name);
    println!("Stored chunks: {}", info.document_count);
    Ok(())
}

/// List every indexed source
#[inline]
pub async fn list_sources() -> Result<()> {
    let kb = open_knowledge_base().await?;
    let sources = kb.list_sources().await.context("Failed to list sources")?;

    if sources.is_empty() {
        println!("No sources have been indexed yet.");
        println!("Use 'kb-engine add <file>' to index a document.");
        return Ok(());
    }

    println!("Indexed sources ({} total):", sources.len());
    for source in &sources {
        println!("  {}", source);
    }
    Ok(())
}

/// Remove every chunk stored for a source
#[inline]
pub async fn delete_source(source: &str) -> Result<()> {
    let kb = open_knowledge_base().await?;
    let removed = kb
        .delete_source(source)
        .await
        .with_context(|| format!("Failed to delete source: {}", source))?;

    if removed == 0 {
        println!("No chunks found for source: {}", source);
    } else {
        println!("Deleted {} chunks for source: {}", removed, source);
    }
    Ok(())
}

fn new_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
