use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::indexing::BatchLimits;

const ENV_CONFIG: &str = "WIKI_INDEXER_CONFIG";
const ENV_QUEUE_CAPACITY: &str = "WIKI_INDEXER_QUEUE_CAPACITY";
const ENV_BATCH_SIZE: &str = "WIKI_INDEXER_BATCH_SIZE";
const ENV_BATCH_MAX_LENGTH: &str = "WIKI_INDEXER_BATCH_MAX_LENGTH";
const ENV_DEFAULT_LOCALE: &str = "WIKI_INDEXER_DEFAULT_LOCALE";

/// Settings of the indexing pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Capacity of the bounded index queue
    pub queue_capacity: usize,

    /// Maximum number of entries per commit
    pub max_batch_size: usize,

    /// Maximum cumulative textual length of the documents in one commit
    pub max_batch_length: usize,

    /// Locale assumed for documents that do not declare one
    pub default_locale: String,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100_000,
            max_batch_size: 50,
            max_batch_length: 10_000,
            default_locale: String::new(),
        }
    }
}

impl IndexerConfig {
    /// Defaults overridden by the `WIKI_INDEXER_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override every field whose environment variable is set, whatever its
    /// value
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = parse_usize_env(ENV_QUEUE_CAPACITY)? {
            self.queue_capacity = value;
        }

        if let Some(value) = parse_usize_env(ENV_BATCH_SIZE)? {
            self.max_batch_size = value;
        }

        if let Some(value) = parse_usize_env(ENV_BATCH_MAX_LENGTH)? {
            self.max_batch_length = value;
        }

        if let Ok(value) = std::env::var(ENV_DEFAULT_LOCALE) {
            self.default_locale = value.trim().to_string();
        }

        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Self =
            toml::from_str(&content).context("Failed to parse TOML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration with priority: env -> file -> defaults
    pub fn load() -> Result<Self> {
        let config_paths = [
            std::env::var(ENV_CONFIG).ok().map(PathBuf::from),
            dirs::config_dir().map(|d| d.join("wiki-indexer").join("indexer.toml")),
            Some(PathBuf::from("indexer.toml")),
        ];

        let mut config = Self::default();
        for config_path in config_paths.into_iter().flatten() {
            if config_path.exists() {
                info!("Loading indexer configuration from {:?}", config_path);
                config = Self::from_file(&config_path)
                    .with_context(|| format!("Failed to load config from {config_path:?}"))?;
                break;
            }
        }

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit file, then environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(anyhow!("queue_capacity must be greater than 0"));
        }

        if self.max_batch_size == 0 {
            return Err(anyhow!("max_batch_size must be greater than 0"));
        }

        if self.max_batch_length == 0 {
            return Err(anyhow!("max_batch_length must be greater than 0"));
        }

        if self.max_batch_size > self.queue_capacity {
            warn!(
                "max_batch_size ({}) exceeds queue_capacity ({}), batches will be cut by the queue",
                self.max_batch_size, self.queue_capacity
            );
        }

        Ok(())
    }

    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            max_size: self.max_batch_size,
            max_length: self.max_batch_length,
        }
    }
}

fn parse_usize_env(var_name: &str) -> Result<Option<usize>> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {var_name}: '{value}'")),
        Err(_) => Ok(None),
    }
}
