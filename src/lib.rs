use thiserror::Error;

use crate::http::ServiceError;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(#[source] ServiceError),

    #[error("Vector store error: {0}")]
    VectorStore(#[source] ServiceError),

    #[error("Completion error: {0}")]
    Completion(#[source] ServiceError),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual} for record {id}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        id: String,
    },

    #[error("Batch {batch} of {source_name} failed: {reason}")]
    BatchFailed {
        source_name: String,
        batch: usize,
        reason: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod answer;
pub mod commands;
pub mod completion;
pub mod config;
pub mod embeddings;
pub mod http;
pub mod ingest;
pub mod records;
pub mod retrieval;
pub mod retry;
pub mod vector_store;
