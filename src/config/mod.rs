// Configuration management module
// TOML configuration loading, validation, and persistence

pub mod settings;

pub use settings::{Config, ConfigError, EmbeddingConfig, ProviderKind, StorageConfig};

/// Get the default configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_config_dir()
}
