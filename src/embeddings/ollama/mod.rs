
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{EmbeddingClient, ensure_count};
use crate::http::{ServiceError, build_agent, endpoint, post_json};

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Client for a local Ollama server's batch `/api/embed` endpoint
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    url: Url,
    model: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    #[serde(rename = "input")]
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    #[inline]
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");

        let url = endpoint(base_url, "api/embed")
            .with_context(|| format!("Failed to generate Ollama URL from {}", base_url))?;

        Ok(Self {
            url,
            model: model.to_string(),
            agent: build_agent(timeout),
        })
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedder {
    #[inline]
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let request = BatchEmbedRequest {
            model: &self.model,
            inputs: texts,
        };
        let response: BatchEmbedResponse = post_json(&self.agent, &self.url, &[], &request)?;

        ensure_count(texts.len(), response.embeddings.len())?;
        debug!(
            "Generated embeddings with {} dimensions",
            response.embeddings.first().map_or(0, Vec::len)
        );
        Ok(response.embeddings)
    }
}
