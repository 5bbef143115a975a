// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for forage
//!
//! Loads configuration from .foragerc.toml in the catalog root or
//! ~/.config/forage/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::embedding::{DEFAULT_IMAGE_DIMENSION, DEFAULT_TEXT_DIMENSION};
use crate::schema::DEFAULT_COLLECTION;
use crate::utils::CATALOG_DIR;

/// Config file name looked up in the catalog root.
pub const CONFIG_FILE: &str = ".foragerc.toml";

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Builtin,
    Command,
    Dummy,
}

/// Store configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database path relative to the catalog root
    pub path: Option<PathBuf>,
    /// Collection name
    pub collection: Option<String>,
}

impl StoreConfig {
    /// Get the database path (defaults to .forage/catalog.sqlite)
    pub fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| Path::new(CATALOG_DIR).join("catalog.sqlite"))
    }

    /// Get the collection name (defaults to "foods")
    pub fn collection(&self) -> &str {
        self.collection.as_deref().unwrap_or(DEFAULT_COLLECTION)
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Text provider type (builtin, command, dummy)
    pub text_provider: Option<ProviderKind>,
    /// Image provider type (command, dummy)
    pub image_provider: Option<ProviderKind>,
    /// Model identifier reported to the text command provider
    pub text_model: Option<String>,
    /// Model identifier reported to the image command provider
    pub image_model: Option<String>,
    /// Command to execute for the text command provider
    pub text_command: Option<String>,
    /// Command to execute for the image command provider
    pub image_command: Option<String>,
    /// Text vector dimension
    pub text_dimension: Option<usize>,
    /// Image vector dimension
    pub image_dimension: Option<usize>,
}

impl EmbeddingConfig {
    /// Get text provider type (defaults to Builtin)
    pub fn text_provider(&self) -> ProviderKind {
        self.text_provider.unwrap_or(ProviderKind::Builtin)
    }

    /// Get image provider type (defaults to Command)
    pub fn image_provider(&self) -> ProviderKind {
        self.image_provider.unwrap_or(ProviderKind::Command)
    }

    /// Get text model identifier (defaults to "minilm")
    pub fn text_model(&self) -> &str {
        self.text_model.as_deref().unwrap_or("minilm")
    }

    /// Get image model identifier (defaults to "clip-vit-b-32")
    pub fn image_model(&self) -> &str {
        self.image_model.as_deref().unwrap_or("clip-vit-b-32")
    }

    /// Get text command (defaults to "text-embedder")
    pub fn text_command(&self) -> &str {
        self.text_command.as_deref().unwrap_or("text-embedder")
    }

    /// Get image command (defaults to "image-embedder")
    pub fn image_command(&self) -> &str {
        self.image_command.as_deref().unwrap_or("image-embedder")
    }

    /// Get text vector dimension (defaults to 384)
    pub fn text_dimension(&self) -> usize {
        self.text_dimension.unwrap_or(DEFAULT_TEXT_DIMENSION)
    }

    /// Get image vector dimension (defaults to 512)
    pub fn image_dimension(&self) -> usize {
        self.image_dimension.unwrap_or(DEFAULT_IMAGE_DIMENSION)
    }
}

/// Search configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default number of results per query
    pub default_limit: Option<usize>,
    /// Per-search timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

impl SearchConfig {
    /// Get default result limit (defaults to 10)
    pub fn default_limit(&self) -> usize {
        self.default_limit.unwrap_or(crate::catalog::DEFAULT_TOP_K)
    }

    /// Get search timeout (defaults to 10 seconds)
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(10_000))
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Maximum records processed concurrently
    pub concurrency: Option<usize>,
    /// Retry attempts for embedding/store calls
    pub retry_max_attempts: Option<u32>,
    /// Base backoff delay in milliseconds
    pub retry_base_delay_ms: Option<u64>,
}

impl IngestSettings {
    /// Get ingestion concurrency (defaults to 4)
    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(4)
    }

    /// Get retry attempt bound (defaults to 3)
    pub fn retry_max_attempts(&self) -> u32 {
        self.retry_max_attempts.unwrap_or(3)
    }

    /// Get base backoff delay (defaults to 200ms)
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms.unwrap_or(200))
    }
}

/// Configuration loaded from .foragerc.toml or ~/.config/forage/config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Ingestion configuration
    #[serde(default)]
    pub ingest: IngestSettings,
}

impl Config {
    /// Load configuration for a catalog root
    ///
    /// Precedence (highest to lowest):
    /// 1. .foragerc.toml in the catalog root
    /// 2. ~/.config/forage/config.toml
    pub fn load_for(root: &Path) -> Self {
        if let Some(config) = Self::load_from_path(&root.join(CONFIG_FILE)) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("forage").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Load configuration from the current directory
    pub fn load() -> Self {
        Self::load_for(Path::new("."))
    }

    fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Get the store configuration
    pub fn store(&self) -> &StoreConfig {
        &self.store
    }

    /// Get the embedding configuration
    pub fn embeddings(&self) -> &EmbeddingConfig {
        &self.embeddings
    }

    /// Get the search configuration
    pub fn search(&self) -> &SearchConfig {
        &self.search
    }

    /// Get the ingestion configuration
    pub fn ingest(&self) -> &IngestSettings {
        &self.ingest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_apply_without_a_file() {
        let config = Config::default();
        assert_eq!(config.store().collection(), "foods");
        assert_eq!(
            config.store().path(),
            Path::new(CATALOG_DIR).join("catalog.sqlite")
        );
        assert_eq!(config.embeddings().text_provider(), ProviderKind::Builtin);
        assert_eq!(config.embeddings().image_provider(), ProviderKind::Command);
        assert_eq!(config.embeddings().text_dimension(), 384);
        assert_eq!(config.embeddings().image_dimension(), 512);
        assert_eq!(config.search().default_limit(), 10);
        assert_eq!(config.search().timeout(), Duration::from_secs(10));
        assert_eq!(config.ingest().concurrency(), 4);
        assert_eq!(config.ingest().retry_max_attempts(), 3);
        assert_eq!(config.ingest().retry_base_delay(), Duration::from_millis(200));
    }

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(
            r#"
            [store]
            path = "data/foods.sqlite"
            collection = "menu"

            [embeddings]
            text_provider = "dummy"
            image_provider = "command"
            image_command = "clip-embed --stdin"
            text_dimension = 16
            image_dimension = 32

            [search]
            default_limit = 5
            timeout_ms = 2500

            [ingest]
            concurrency = 8
            retry_max_attempts = 5
            retry_base_delay_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.store().collection(), "menu");
        assert_eq!(config.store().path(), PathBuf::from("data/foods.sqlite"));
        assert_eq!(config.embeddings().text_provider(), ProviderKind::Dummy);
        assert_eq!(config.embeddings().image_command(), "clip-embed --stdin");
        assert_eq!(config.embeddings().text_dimension(), 16);
        assert_eq!(config.embeddings().image_dimension(), 32);
        assert_eq!(config.search().default_limit(), 5);
        assert_eq!(config.search().timeout(), Duration::from_millis(2500));
        assert_eq!(config.ingest().concurrency(), 8);
        assert_eq!(config.ingest().retry_max_attempts(), 5);
        assert_eq!(config.ingest().retry_base_delay(), Duration::from_millis(50));
    }

    #[test]
    fn load_for_reads_root_config() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "[store]\ncollection = \"snacks\"\n",
        )
        .unwrap();

        let config = Config::load_for(dir.path());
        assert_eq!(config.store().collection(), "snacks");
    }

    #[test]
    fn malformed_config_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "not [valid toml").unwrap();

        let config = Config::load_for(dir.path());
        assert_eq!(config.store().collection(), "foods");
    }
}
