// Retrieval pipeline: embed the query, ask the store, hand back metadata
// No retry on this path; the caller is interactive


use std::sync::Arc;
use tracing::{debug, info};

use crate::config::settings::DEFAULT_TOP_K;
use crate::embeddings::{EmbeddingClient, embed_query};
use crate::records::Metadata;
use crate::vector_store::{Match, VectorStoreClient};
use crate::{RagError, Result};

pub struct RetrievalPipeline {
    embedder: Arc<dyn EmbeddingClient>,
    store: VectorStoreClient,
    top_k: usize,
}

impl std::fmt::Debug for RetrievalPipeline {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalPipeline")
            .field("model", &self.embedder.model())
            .field("store", &self.store)
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl RetrievalPipeline {
    #[inline]
    pub fn new(embedder: Arc<dyn EmbeddingClient>, store: VectorStoreClient) -> Self {
        Self {
            embedder,
            store,
            top_k: DEFAULT_TOP_K,
        }
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Metadata of the nearest records, in the store's similarity order
    #[inline]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Metadata>> {
        self.retrieve_top(query, self.top_k).await
    }

    /// `retrieve` with an explicit result bound
    #[inline]
    pub async fn retrieve_top(&self, query: &str, top_k: usize) -> Result<Vec<Metadata>> {
        let matches = self.matches(query, top_k).await?;
        Ok(matches.into_iter().map(|m| m.metadata).collect())
    }

    /// Full matches including ids and scores
    #[inline]
    pub async fn matches(&self, query: &str, top_k: usize) -> Result<Vec<Match>> {
        debug!("Embedding query ({} chars)", query.chars().count());
        let vector = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(RagError::Embedding)?;

        let matches = self
            .store
            .query(&vector, top_k)
            .await
            .map_err(RagError::VectorStore)?;

        info!(
            "Retrieved {} match(es) from namespace {}",
            matches.len(),
            self.store.namespace()
        );
        Ok(matches)
    }
}
