// API keys, read from the environment only


use std::fmt;

use super::settings::{Config, ConfigError, EmbeddingProvider, VectorBackend};
use super::{OPENAI_API_KEY_ENV, PINECONE_API_KEY_ENV};

/// What the process is about to do; decides which credentials are required
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    Ingest,
    Query,
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    openai_api_key: Option<String>,
    pinecone_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &redact(self.openai_api_key.as_deref()))
            .field("pinecone_api_key", &redact(self.pinecone_api_key.as_deref()))
            .finish()
    }
}

/// Display form of a secret: whether it is set, never its value
#[inline]
pub fn redact(secret: Option<&str>) -> &'static str {
    if secret.is_some() { "<set>" } else { "<unset>" }
}

impl Credentials {
    #[inline]
    pub fn new(openai_api_key: Option<String>, pinecone_api_key: Option<String>) -> Self {
        let clean = |key: Option<String>| {
            key.map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
        };
        Self {
            openai_api_key: clean(openai_api_key),
            pinecone_api_key: clean(pinecone_api_key),
        }
    }

    /// Collect whatever keys `lookup` provides, without validation
    #[inline]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::new(lookup(OPENAI_API_KEY_ENV), lookup(PINECONE_API_KEY_ENV))
    }

    /// Read keys from the process environment and fail fast if `workload` needs one that is missing
    #[inline]
    pub fn from_env(config: &Config, workload: Workload) -> Result<Self, ConfigError> {
        let credentials = Self::from_lookup(|name| std::env::var(name).ok());
        credentials.validate_for(config, workload)?;
        Ok(credentials)
    }

    #[inline]
    pub fn validate_for(&self, config: &Config, workload: Workload) -> Result<(), ConfigError> {
        if config.embedding.provider == EmbeddingProvider::OpenAi {
            self.require_openai()?;
        }
        if config.vector_store.backend == VectorBackend::Pinecone {
            self.require_pinecone()?;
        }
        if workload == Workload::Query {
            self.require_openai()?;
        }
        Ok(())
    }

    #[inline]
    pub fn require_openai(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential(OPENAI_API_KEY_ENV))
    }

    #[inline]
    pub fn require_pinecone(&self) -> Result<&str, ConfigError> {
        self.pinecone_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential(PINECONE_API_KEY_ENV))
    }

    #[inline]
    pub fn openai_api_key(&self) -> Option<&str> {
        self.openai_api_key.as_deref()
    }

    #[inline]
    pub fn pinecone_api_key(&self) -> Option<&str> {
        self.pinecone_api_key.as_deref()
    }
}
