
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::{
    ChunkParams, MAX_CHUNK_OVERLAP, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkParams,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Collection name inside the vector store.
    pub collection_name: String,
    /// Directory holding the original uploaded documents, used as a fallback
    /// when a chunk's recorded file path has gone stale.
    pub upload_dir: PathBuf,
    /// Override for the vector store location; defaults to `<base_dir>/vectors`.
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            collection_name: "knowledge_base".to_string(),
            upload_dir: PathBuf::from("uploads"),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub model: String,
    /// Compute device identifier for the local provider.
    pub device: String,
    /// Vector dimension of the local provider.
    pub dimension: u32,
    /// Base URL of the OpenAI-compatible embeddings API (remote provider).
    pub base_url: String,
    /// API key for the remote provider; falls back to `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: String,
    /// Number of texts sent per embedding request.
    pub batch_size: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Local,
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            device: "cpu".to_string(),
            dimension: 384,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            batch_size: 16,
        }
    }
}

impl EmbeddingConfig {
    /// Explicit key if configured, else the configured environment variable.
    #[inline]
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid chunk size: {0} (must be between {MIN_CHUNK_SIZE} and {MAX_CHUNK_SIZE})")]
    InvalidChunkSize(usize),
    #[error("Invalid chunk overlap: {0} (must be between 0 and {MAX_CHUNK_OVERLAP})")]
    InvalidChunkOverlap(usize),
    #[error("Chunk overlap ({0}) must be less than chunk size ({1})")]
    OverlapNotLessThanChunkSize(usize, usize),
    #[error("Invalid collection name: {0:?} (cannot be empty)")]
    InvalidCollectionName(String),
    #[error("Invalid model name: {0:?} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                storage: StorageConfig::default(),
                embedding: EmbeddingConfig::default(),
                chunking: ChunkParams::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!("Failed to create config directory: {}", self.base_dir.display())
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.collection_name.trim().is_empty() {
            return Err(ConfigError::InvalidCollectionName(
                self.storage.collection_name.clone(),
            ));
        }

        self.validate_chunking()?;
        self.validate_embedding()?;
        Ok(())
    }

    fn validate_chunking(&self) -> Result<(), ConfigError> {
        let params = &self.chunking;

        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&params.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(params.chunk_size));
        }

        if params.chunk_overlap > MAX_CHUNK_OVERLAP {
            return Err(ConfigError::InvalidChunkOverlap(params.chunk_overlap));
        }

        if params.chunk_overlap >= params.chunk_size {
            return Err(ConfigError::OverlapNotLessThanChunkSize(
                params.chunk_overlap,
                params.chunk_size,
            ));
        }

        Ok(())
    }

    fn validate_embedding(&self) -> Result<(), ConfigError> {
        let embedding = &self.embedding;

        if embedding.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(embedding.model.clone()));
        }

        if embedding.batch_size == 0 || embedding.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(embedding.batch_size));
        }

        if !(64..=4096).contains(&embedding.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(embedding.dimension));
        }

        Url::parse(&embedding.base_url)
            .map_err(|_| ConfigError::InvalidUrl(embedding.base_url.clone()))?;

        Ok(())
    }

    /// Get the default configuration directory (`~/.config/kb-engine` or the
    /// platform equivalent).
    #[inline]
    pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir()
            .ok_or(ConfigError::DirectoryError)?
            .join("kb-engine");
        fs::create_dir_all(&dir).map_err(|_| ConfigError::DirectoryError)?;
        Ok(dir)
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("vectors"))
    }

    /// Get the upload directory, resolved relative to the base directory when
    /// the configured path is relative.
    #[inline]
    pub fn upload_dir_path(&self) -> PathBuf {
        if self.storage.upload_dir.is_absolute() {
            self.storage.upload_dir.clone()
        } else {
            self.base_dir.join(&self.storage.upload_dir)
        }
    }
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkParams::default(),
            base_dir: PathBuf::new(),
        }
    }
}
