//! SQLite-backed vector store.
//!
//! Chunks and their embeddings live in a single SQLite file inside the
//! vector store directory; search is brute-force cosine similarity.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{ChunkSearchResult, StoredChunk, VectorStore};
use crate::core::errors::ApiError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteVectorStore {
    /// Opens the store at `db_path`, creating the file and its parent
    /// directory when missing.
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ApiError::internal(format!(
                        "Failed to create vector store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                page INTEGER,
                start_offset INTEGER NOT NULL DEFAULT 0,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS store_meta (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (collection, key)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<StoredChunk, ApiError> {
        let start_offset: i64 = row.try_get("start_offset")?;
        Ok(StoredChunk {
            chunk_id: row.try_get("chunk_id")?,
            content: row.try_get("content")?,
            source: row.try_get("source")?,
            page: row.try_get("page")?,
            start_offset: start_offset.max(0) as usize,
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert_batch(
        &self,
        collection: &str,
        items: Vec<(StoredChunk, Vec<f32>)>,
    ) -> Result<(), ApiError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for (chunk, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);
            sqlx::query(
                "INSERT OR REPLACE INTO chunks
                    (chunk_id, collection, content, source, page, start_offset, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&chunk.chunk_id)
            .bind(collection)
            .bind(&chunk.content)
            .bind(&chunk.source)
            .bind(chunk.page)
            .bind(chunk.start_offset as i64)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        collection: &str,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT chunk_id, content, source, page, start_offset, embedding
             FROM chunks
             WHERE collection = ?1",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let embedding_bytes: Vec<u8> = row.try_get("embedding")?;
            if embedding_bytes.is_empty() {
                continue;
            }
            let stored = Self::deserialize_embedding(&embedding_bytes);
            scored.push(ChunkSearchResult {
                chunk: Self::row_to_chunk(row)?,
                score: Self::cosine_similarity(query_embedding, &stored),
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?1")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(count as usize)
    }

    async fn reset(&self, collection: &str, embedding_model: &str) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("DELETE FROM chunks WHERE collection = ?1")
            .bind(collection)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "INSERT OR REPLACE INTO store_meta (collection, key, value, updated_at)
             VALUES (?1, 'embedding_model', ?2, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(collection)
        .bind(embedding_model)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn embedding_model(&self, collection: &str) -> Result<Option<String>, ApiError> {
        let model = sqlx::query_scalar(
            "SELECT value FROM store_meta WHERE collection = ?1 AND key = 'embedding_model'",
        )
        .bind(collection)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (SqliteVectorStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("vstore").join("vectors.db"))
            .await
            .unwrap();
        (store, dir)
    }

    fn make_chunk(id: &str, content: &str, page: i64) -> StoredChunk {
        StoredChunk {
            chunk_id: id.to_string(),
            content: content.to_string(),
            source: "guide.pdf".to_string(),
            page: Some(page),
            start_offset: 0,
        }
    }

    #[tokio::test]
    async fn search_orders_by_similarity_and_respects_k() {
        let (store, _dir) = test_store().await;
        store
            .insert_batch(
                "docs",
                vec![
                    (make_chunk("c1", "exact", 0), vec![1.0, 0.0, 0.0]),
                    (make_chunk("c2", "close", 1), vec![0.8, 0.6, 0.0]),
                    (make_chunk("c3", "far", 2), vec![0.0, 0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 2, "docs").await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert!(results[0].score > 0.99);
        assert_eq!(results[1].chunk.page, Some(1));
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let (store, _dir) = test_store().await;
        store
            .insert_batch("a", vec![(make_chunk("a1", "alpha", 0), vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .insert_batch("b", vec![(make_chunk("b1", "beta", 0), vec![1.0, 0.0])])
            .await
            .unwrap();

        assert_eq!(store.count("a").await.unwrap(), 1);
        let results = store.search(&[1.0, 0.0], 10, "b").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.chunk_id, "b1");
        assert!(store.search(&[1.0, 0.0], 10, "missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_clears_collection_and_records_model() {
        let (store, _dir) = test_store().await;
        store
            .insert_batch("docs", vec![(make_chunk("c1", "data", 0), vec![1.0])])
            .await
            .unwrap();
        store
            .insert_batch("other", vec![(make_chunk("o1", "data", 0), vec![1.0])])
            .await
            .unwrap();

        store.reset("docs", "hashed-384").await.unwrap();

        assert_eq!(store.count("docs").await.unwrap(), 0);
        assert_eq!(store.count("other").await.unwrap(), 1);
        assert_eq!(
            store.embedding_model("docs").await.unwrap().as_deref(),
            Some("hashed-384")
        );
        assert!(store.embedding_model("other").await.unwrap().is_none());
    }

    #[test]
    fn cosine_handles_mismatched_and_zero_vectors() {
        assert_eq!(SqliteVectorStore::cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(SqliteVectorStore::cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        let bytes = SqliteVectorStore::serialize_embedding(&[0.5, -2.0]);
        assert_eq!(SqliteVectorStore::deserialize_embedding(&bytes), vec![0.5, -2.0]);
    }
}
