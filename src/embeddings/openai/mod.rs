
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{EmbeddingClient, ensure_count};
use crate::http::{ServiceError, build_agent, endpoint, post_json};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for OpenAI-compatible `/embeddings` endpoints
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    url: Url,
    model: String,
    authorization: String,
    dimensions: Option<usize>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl OpenAiEmbedder {
    #[inline]
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");

        let url = endpoint(base_url, "embeddings")
            .with_context(|| format!("Invalid embedding base URL: {}", base_url))?;

        Ok(Self {
            url,
            model: model.to_string(),
            authorization: format!("Bearer {}", api_key.trim()),
            dimensions,
            agent: build_agent(timeout),
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedder {
    #[inline]
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Requesting {} embeddings from {}", texts.len(), self.model);

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };
        let mut response: EmbeddingResponse = post_json(
            &self.agent,
            &self.url,
            &[("Authorization", self.authorization.as_str())],
            &request,
        )?;

        ensure_count(texts.len(), response.data.len())?;
        response.data.sort_by_key(|entry| entry.index);

        Ok(response
            .data
            .into_iter()
            .map(|entry| entry.embedding)
            .collect())
    }
}
