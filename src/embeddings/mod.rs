// Embeddings module
// One model per process; no retries here, the ingestion pipeline owns rate-limit recovery

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Config, Credentials, EmbeddingProvider};
use crate::http::ServiceError;

pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

/// Converts texts into equal-length vectors, preserving order
///
/// Implementations may block the calling thread while a request is in flight;
/// the HTTP backends use a blocking agent inside their async methods.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Model identifier sent with every request
    fn model(&self) -> &str;

    /// Embed `texts`; an empty slice returns an empty result without a network call
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}

/// Embed a single query string
#[inline]
pub async fn embed_query(
    client: &dyn EmbeddingClient,
    text: &str,
) -> Result<Vec<f32>, ServiceError> {
    client
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::Permanent("Empty embedding response".to_string()))
}

/// Fail unless the service returned exactly one vector per input
pub(crate) fn ensure_count(expected: usize, actual: usize) -> Result<(), ServiceError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ServiceError::Permanent(format!(
            "Mismatch between request and response counts: {} vs {}",
            expected, actual
        )))
    }
}

/// Build the configured embedding backend
#[inline]
pub fn from_config(
    config: &Config,
    credentials: &Credentials,
) -> anyhow::Result<Arc<dyn EmbeddingClient>> {
    let timeout = config.ingest.request_timeout();
    let client: Arc<dyn EmbeddingClient> = match config.embedding.provider {
        EmbeddingProvider::OpenAi => Arc::new(OpenAiEmbedder::new(
            config.embedding.base_url(),
            &config.embedding.model,
            credentials.require_openai()?,
            config.embedding.dimension,
            timeout,
        )?),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(
            config.embedding.base_url(),
            &config.embedding.model,
            timeout,
        )?),
    };
    Ok(client)
}
