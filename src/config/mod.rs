// Configuration management module
// TOML file in the config directory, environment for credentials and overrides

pub mod credentials;
pub mod settings;


use std::path::PathBuf;

pub use credentials::{Credentials, Workload};
pub use settings::{
    CompletionConfig, Config, ConfigError, EmbeddingConfig, EmbeddingProvider, IngestConfig,
    RetrievalConfig, SourceConfig, VectorBackend, VectorStoreConfig,
};

/// Overrides the configuration directory
pub const CONFIG_DIR_ENV: &str = "GITA_RAG_CONFIG_DIR";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const PINECONE_API_KEY_ENV: &str = "PINECONE_API_KEY";
pub const PINECONE_HOST_ENV: &str = "PINECONE_HOST";
pub const NAMESPACE_ENV: &str = "GITA_RAG_NAMESPACE";

/// Get the configuration directory path
///
/// `$GITA_RAG_CONFIG_DIR` wins; otherwise `gita-rag` under the platform config dir.
#[inline]
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    resolve_config_dir(|name| std::env::var(name).ok())
}

fn resolve_config_dir<F>(lookup: F) -> Result<PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(CONFIG_DIR_ENV).filter(|value| !value.trim().is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    dirs::config_dir()
        .map(|dir| dir.join("gita-rag"))
        .ok_or(ConfigError::DirectoryError)
}
