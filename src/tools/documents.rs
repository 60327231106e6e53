use std::fmt::Write as _;

use serde::Deserialize;

use crate::core::errors::ApiError;
use crate::llm::Embedder;
use crate::rag::VectorStore;

pub const DEFAULT_K: usize = 5;

#[derive(Debug, Deserialize)]
pub struct DocumentArgs {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
}

pub const STORE_UNAVAILABLE: &str = "Error: The document vector store is not available or failed to initialize. Please check server logs.";

/// Similarity search over the ingested guideline PDFs.
pub async fn search_documents(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    collection: &str,
    args: &DocumentArgs,
    default_k: usize,
) -> Result<String, ApiError> {
    let query = args.query.trim();
    let k = args.k.filter(|k| *k > 0).unwrap_or(default_k).min(20);

    let embedding = embedder.embed_query(query).await?;
    let hits = store.search(&embedding, k, collection).await?;
    if hits.is_empty() {
        return Ok(format!(
            "No detailed documents found matching the query: '{}'",
            query
        ));
    }

    let mut out = format!(
        "Found {} relevant document chunks for '{}':\n",
        hits.len(),
        query
    );
    for (i, hit) in hits.iter().enumerate() {
        let page = hit
            .chunk
            .page
            .map(|p| p.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        let _ = write!(
            out,
            "\n**--- Chunk {} (Source: {}, Page: {}) ---**\n{}\n",
            i + 1,
            hit.chunk.source,
            page,
            hit.chunk.content
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashedEmbedder;
    use crate::rag::{SqliteVectorStore, StoredChunk};

    async fn store_with_docs(embedder: &HashedEmbedder) -> (SqliteVectorStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("vectors.db"))
            .await
            .unwrap();
        let texts = [
            "Gift funds are allowed from family members with a gift letter.",
            "Declining market policy reduces max LTV by 5%.",
        ];
        let vectors = embedder
            .embed(&texts.iter().map(|t| t.to_string()).collect::<Vec<_>>())
            .await
            .unwrap();
        let items = texts
            .iter()
            .enumerate()
            .zip(vectors)
            .map(|((i, text), v)| {
                (
                    StoredChunk {
                        chunk_id: format!("c{}", i),
                        content: text.to_string(),
                        source: "nqm.pdf".to_string(),
                        page: Some(i as i64 + 3),
                        start_offset: 0,
                    },
                    v,
                )
            })
            .collect();
        store.insert_batch("docs", items).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn renders_chunks_with_source_and_page() {
        let embedder = HashedEmbedder::new(256);
        let (store, _dir) = store_with_docs(&embedder).await;
        let args = DocumentArgs {
            query: "gift funds family".to_string(),
            k: Some(1),
        };

        let out = search_documents(&store, &embedder, "docs", &args, DEFAULT_K)
            .await
            .unwrap();

        assert!(out.starts_with("Found 1 relevant document chunks for 'gift funds family':\n"));
        assert!(out.contains("**--- Chunk 1 (Source: nqm.pdf, Page: 3) ---**\nGift funds"));
    }

    #[tokio::test]
    async fn empty_collection_reports_no_documents() {
        let embedder = HashedEmbedder::new(32);
        let (store, _dir) = store_with_docs(&embedder).await;
        let args = DocumentArgs {
            query: "reserves".to_string(),
            k: None,
        };

        let out = search_documents(&store, &embedder, "other", &args, DEFAULT_K)
            .await
            .unwrap();
        assert_eq!(out, "No detailed documents found matching the query: 'reserves'");
    }
}
