// Vector store module
// `VectorIndex` is one attempt against a backend; `VectorStoreClient` adds the
// process namespace and the transient-failure retry policy for upserts


pub mod lance;
pub mod pinecone;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{Config, Credentials, VectorBackend};
use crate::http::ServiceError;
use crate::records::Metadata;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper, retry_transient};

pub use self::lance::LanceIndex;
pub use self::pinecone::PineconeIndex;

/// A record's embedding plus its metadata, keyed by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

/// One similarity hit, in the store's native ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Collapse repeated ids so the last occurrence wins, keeping its position
#[inline]
pub fn latest_by_id(vectors: &[Vector]) -> Vec<&Vector> {
    let mut seen = HashSet::with_capacity(vectors.len());
    let mut latest: Vec<&Vector> = vectors
        .iter()
        .rev()
        .filter(|vector| seen.insert(vector.id.as_str()))
        .collect();
    latest.reverse();
    latest
}

/// A vector similarity backend; every call is a single attempt
///
/// Implementations may block the calling thread for the duration of a
/// request (the HTTP backends use a blocking agent); callers issue one
/// request at a time.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite `vectors` by id; all-or-nothing for the call
    ///
    /// Repeated ids within one call resolve to the last occurrence.
    async fn upsert(&self, namespace: &str, vectors: &[Vector]) -> Result<usize, ServiceError>;

    /// Up to `top_k` nearest vectors, best first
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<Match>, ServiceError>;
}

/// Result of an acknowledged upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub upserted: usize,
    pub attempts: u32,
}

/// Namespace-bound store client shared by ingestion and retrieval
#[derive(Clone)]
pub struct VectorStoreClient {
    index: Arc<dyn VectorIndex>,
    namespace: String,
    retry_policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for VectorStoreClient {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreClient")
            .field("namespace", &self.namespace)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

impl VectorStoreClient {
    #[inline]
    pub fn new(index: Arc<dyn VectorIndex>, namespace: impl Into<String>) -> Self {
        Self {
            index,
            namespace: namespace.into(),
            retry_policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    #[inline]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[inline]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Upsert one batch, retrying transient failures with exponential backoff
    ///
    /// On error the whole batch must be treated as not written.
    #[inline]
    pub async fn upsert(&self, vectors: &[Vector]) -> Result<UpsertOutcome, ServiceError> {
        if vectors.is_empty() {
            debug!("No vectors to upsert");
            return Ok(UpsertOutcome {
                upserted: 0,
                attempts: 0,
            });
        }

        let operation = format!("upsert of {} vectors", vectors.len());
        let retried = retry_transient(
            &self.retry_policy,
            self.sleeper.as_ref(),
            &operation,
            || self.index.upsert(&self.namespace, vectors),
        )
        .await?;

        debug!(
            "Upserted {} vectors into namespace {} in {} attempt(s)",
            retried.value, self.namespace, retried.attempts
        );

        Ok(UpsertOutcome {
            upserted: retried.value,
            attempts: retried.attempts,
        })
    }

    /// Nearest `top_k` matches with metadata; no retry
    #[inline]
    pub async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>, ServiceError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let mut matches = self
            .index
            .query(&self.namespace, vector, top_k, true)
            .await?;
        matches.truncate(top_k);
        Ok(matches)
    }
}

/// Build the configured backend bound to the configured namespace
#[inline]
pub async fn from_config(
    config: &Config,
    credentials: &Credentials,
) -> anyhow::Result<VectorStoreClient> {
    let timeout = config.ingest.request_timeout();
    let index: Arc<dyn VectorIndex> = match config.vector_store.backend {
        VectorBackend::Pinecone => {
            let host = config.vector_store.host.as_deref().ok_or_else(|| {
                anyhow::anyhow!("vector_store.host is required for the pinecone backend")
            })?;
            Arc::new(PineconeIndex::new(
                host,
                credentials.require_pinecone()?,
                timeout,
            )?)
        }
        VectorBackend::LanceDb => Arc::new(LanceIndex::open(&config.vector_database_path()).await?),
    };

    info!(
        "Using {:?} vector store, namespace {}",
        config.vector_store.backend, config.vector_store.namespace
    );

    Ok(
        VectorStoreClient::new(index, config.vector_store.namespace.clone())
            .with_retry_policy(config.ingest.retry_policy()),
    )
}
