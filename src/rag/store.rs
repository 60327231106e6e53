//! VectorStore trait: storage backend for embedded document chunks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// A chunk of an ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub content: String,
    /// File name of the source document.
    pub source: String,
    /// 0-based page number inside the source document.
    pub page: Option<i64>,
    /// Character offset of the chunk inside its page.
    pub start_offset: usize,
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSearchResult {
    pub chunk: StoredChunk,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert_batch(
        &self,
        collection: &str,
        items: Vec<(StoredChunk, Vec<f32>)>,
    ) -> Result<(), ApiError>;

    /// Top `k` chunks of `collection` by similarity to `query_embedding`.
    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        collection: &str,
    ) -> Result<Vec<ChunkSearchResult>, ApiError>;

    async fn count(&self, collection: &str) -> Result<usize, ApiError>;

    /// Drops every chunk of `collection` and records the model that will
    /// produce its new vectors.
    async fn reset(&self, collection: &str, embedding_model: &str) -> Result<(), ApiError>;

    async fn embedding_model(&self, collection: &str) -> Result<Option<String>, ApiError>;
}
