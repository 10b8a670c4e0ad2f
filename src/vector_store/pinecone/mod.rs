
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{Match, Vector, VectorIndex, latest_by_id};
use crate::http::{ServiceError, build_agent, endpoint, post_json};

/// Pinecone-style index reached over HTTPS at a per-index host
#[derive(Debug, Clone)]
pub struct PineconeIndex {
    upsert_url: Url,
    query_url: Url,
    api_key: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<&'a Vector>,
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

impl PineconeIndex {
    /// `host` is the index endpoint; a bare hostname gets `https://` prepended
    #[inline]
    pub fn new(host: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing vector store API key");
        anyhow::ensure!(!host.trim().is_empty(), "missing vector store host");

        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };

        let upsert_url = endpoint(&base, "vectors/upsert")
            .with_context(|| format!("Invalid vector store host: {}", host))?;
        let query_url =
            endpoint(&base, "query").with_context(|| format!("Invalid vector store host: {}", host))?;

        Ok(Self {
            upsert_url,
            query_url,
            api_key: api_key.trim().to_string(),
            agent: build_agent(timeout),
        })
    }

    fn headers(&self) -> [(&str, &str); 1] {
        [("Api-Key", self.api_key.as_str())]
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, namespace: &str, vectors: &[Vector]) -> Result<usize, ServiceError> {
        if vectors.is_empty() {
            return Ok(0);
        }

        let vectors = latest_by_id(vectors);
        let sent = vectors.len();
        debug!("Upserting {} vectors into {}", sent, namespace);

        let request = UpsertRequest { vectors, namespace };
        let response: UpsertResponse =
            post_json(&self.agent, &self.upsert_url, &self.headers(), &request)?;

        Ok(response.upserted_count.unwrap_or(sent))
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<Match>, ServiceError> {
        debug!("Querying {} for top {} matches", namespace, top_k);

        let request = QueryRequest {
            namespace,
            vector,
            top_k,
            include_metadata,
            include_values: false,
        };
        let response: QueryResponse =
            post_json(&self.agent, &self.query_url, &self.headers(), &request)?;

        debug!("Query returned {} matches", response.matches.len());
        Ok(response.matches)
    }
}
