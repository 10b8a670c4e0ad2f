#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::{NAMESPACE_ENV, PINECONE_HOST_ENV};
use crate::embeddings::ollama::DEFAULT_OLLAMA_BASE_URL;
use crate::embeddings::openai::DEFAULT_OPENAI_BASE_URL;
use crate::records::RecordFamily;
use crate::retry::RetryPolicy;

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_NAMESPACE: &str = "gita";
pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_TOP_K: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    OpenAi,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    /// Defaults to the provider's public endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub model: String,
    /// Expected vector length; checked against every embedded batch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAi,
            base_url: None,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: None,
        }
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url,
            (None, EmbeddingProvider::OpenAi) => DEFAULT_OPENAI_BASE_URL,
            (None, EmbeddingProvider::Ollama) => DEFAULT_OLLAMA_BASE_URL,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    Pinecone,
    LanceDb,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorBackend,
    /// Index host for the pinecone backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub namespace: String,
    /// LanceDB directory; relative paths resolve against the config directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Pinecone,
            host: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_backoff_ms: Option<u64>,
    pub rate_limit_cooldown_secs: u64,
    pub max_rate_limit_waits: u32,
    pub pacing_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: None,
            max_total_backoff_ms: None,
            rate_limit_cooldown_secs: 20,
            max_rate_limit_waits: 10,
            pacing_ms: 300,
            request_timeout_secs: 120,
        }
    }
}

impl IngestConfig {
    /// Backoff policy for vector store upserts
    #[inline]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
            .with_max_delay(self.max_delay_ms.map(Duration::from_millis))
            .with_max_total_delay(self.max_total_backoff_ms.map(Duration::from_millis))
    }

    #[inline]
    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    #[inline]
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// One input file and the record family its rows belong to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    pub family: RecordFamily,
    pub path: PathBuf,
}

fn default_sources() -> Vec<SourceConfig> {
    RecordFamily::ALL
        .iter()
        .map(|family| SourceConfig {
            family: *family,
            path: PathBuf::from(format!("data/{}.csv", family.source_name())),
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0} (must be an http or https URL)")]
    InvalidUrl(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid max attempts: {0} (must be at least 1)")]
    InvalidMaxAttempts(u32),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid temperature: {0} (must be between 0 and 2)")]
    InvalidTemperature(f64),
    #[error("Invalid embedding dimension: {0} (must be greater than zero)")]
    InvalidEmbeddingDimension(usize),
    #[error("Vector store namespace cannot be empty")]
    EmptyNamespace,
    #[error("Missing required credential: set {0}")]
    MissingCredential(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            completion: CompletionConfig::default(),
            ingest: IngestConfig::default(),
            retrieval: RetrievalConfig::default(),
            sources: default_sources(),
            base_dir: PathBuf::new(),
        }
    }
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::InvalidUrl(url.to_string())),
    }
}

impl Config {
    /// Load `config.toml` from `config_dir`, apply environment overrides, and validate
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        Self::load_with(config_dir, |name| std::env::var(name).ok())
    }

    /// `load` with an explicit environment lookup
    #[inline]
    pub fn load_with<P, F>(config_dir: P, lookup: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let config_dir = config_dir.as_ref();
        let config_path = config_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str::<Config>(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };
        config.base_dir = config_dir.to_path_buf();
        config.apply_env_overrides(lookup);

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Environment values take precedence over the file
    #[inline]
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(host) = non_empty(PINECONE_HOST_ENV) {
            debug!("Vector store host overridden by {}", PINECONE_HOST_ENV);
            self.vector_store.host = Some(host.trim().to_string());
        }
        if let Some(namespace) = non_empty(NAMESPACE_ENV) {
            debug!("Namespace overridden by {}", NAMESPACE_ENV);
            self.vector_store.namespace = namespace.trim().to_string();
        }
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the local vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        match &self.vector_store.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.get_base_dir().join(path),
            None => self.get_base_dir().join("vectors"),
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.vector_store.validate()?;
        self.completion.validate()?;
        self.ingest.validate()?;

        if !(1..=100).contains(&self.retrieval.top_k) {
            return Err(ConfigError::InvalidTopK(self.retrieval.top_k));
        }

        Ok(())
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(self.base_url())?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.dimension == Some(0) {
            return Err(ConfigError::InvalidEmbeddingDimension(0));
        }

        Ok(())
    }
}

impl VectorStoreConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        Ok(())
    }
}

impl CompletionConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.base_url)?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        Ok(())
    }
}

impl IngestConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(self.max_attempts));
        }

        Ok(())
    }
}
