//! Vector store build and diagnostics for the `ingest` and `probe` commands.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use super::pdf::{self, PdfPage};
use super::splitter::TextSplitter;
use super::sqlite::SqliteVectorStore;
use super::store::{ChunkSearchResult, StoredChunk, VectorStore};
use crate::core::config::{IngestSettings, VectorStoreSettings};
use crate::llm::Embedder;

/// Diagnostic queries run by `probe` when none are given.
pub const DEFAULT_PROBE_QUERIES: [&str; 2] = [
    "loan to value ratio",
    "Flex Select program guidelines NQM FUNDING",
];
pub const DEFAULT_PROBE_K: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub files: usize,
    pub skipped: Vec<PathBuf>,
    pub chunks: usize,
    pub store_path: PathBuf,
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Vector store created at '{}': {} chunks from {} PDF file(s)",
            self.store_path.display(),
            self.chunks,
            self.files - self.skipped.len()
        )?;
        if !self.skipped.is_empty() {
            write!(f, ", {} skipped", self.skipped.len())?;
        }
        Ok(())
    }
}

/// Rebuilds the vector store from scratch out of every PDF in the PDF directory.
pub async fn build_vector_store(
    ingest: &IngestSettings,
    vector_store: &VectorStoreSettings,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<IngestReport> {
    tracing::info!(
        "Starting vector store build: dir={}, collection={}, pdf_dir={}",
        vector_store.dir.display(),
        vector_store.collection_name,
        ingest.pdf_dir.display()
    );

    if vector_store.dir.exists() {
        tracing::warn!(
            "Existing vector store found, deleting {} for a fresh build",
            vector_store.dir.display()
        );
        std::fs::remove_dir_all(&vector_store.dir).with_context(|| {
            format!(
                "Could not delete directory '{}'. Is it in use?",
                vector_store.dir.display()
            )
        })?;
    }
    std::fs::create_dir_all(&vector_store.dir)?;

    let files = pdf::find_pdfs(&ingest.pdf_dir)?;
    if files.is_empty() {
        bail!(
            "No PDF files found in '{}'. Aborting.",
            ingest.pdf_dir.display()
        );
    }
    tracing::info!("Found {} PDF files to process", files.len());

    let splitter = TextSplitter::new(ingest.chunk_size, ingest.chunk_overlap);
    let (chunks, skipped) = collect_chunks(&files, &splitter).await;
    if chunks.is_empty() {
        bail!("No documents were successfully processed. Vector store will not be built.");
    }
    tracing::info!("Created {} text chunks", chunks.len());

    let store = SqliteVectorStore::open(vector_store.db_path()).await?;
    let indexed = index_chunks(
        &store,
        embedder,
        &vector_store.collection_name,
        chunks,
        batch_size,
    )
    .await?;

    Ok(IngestReport {
        files: files.len(),
        skipped,
        chunks: indexed,
        store_path: vector_store.dir.clone(),
    })
}

/// Splits every readable PDF; files that fail to parse are skipped.
async fn collect_chunks(
    files: &[PathBuf],
    splitter: &TextSplitter,
) -> (Vec<StoredChunk>, Vec<PathBuf>) {
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );

    let mut chunks = Vec::new();
    let mut skipped = Vec::new();
    for path in files {
        let source = file_name(path);
        pb.set_message(format!("Processing {}", source));
        match pdf::load_pages(path).await {
            Ok(pages) => chunks.extend(chunk_pages(&source, &pages, splitter)),
            Err(e) => {
                pb.suspend(|| {
                    tracing::warn!("Failed to process '{}', skipping file: {:#}", source, e)
                });
                skipped.push(path.clone());
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("PDFs processed");
    (chunks, skipped)
}

/// Splits each page on its own so that every chunk keeps its page number.
pub fn chunk_pages(source: &str, pages: &[PdfPage], splitter: &TextSplitter) -> Vec<StoredChunk> {
    let mut out = Vec::new();
    for page in pages {
        for chunk in splitter.split(&page.text) {
            out.push(StoredChunk {
                chunk_id: format!("{}#p{}-c{}", source, page.page, chunk.chunk_index),
                content: chunk.text,
                source: source.to_string(),
                page: Some(page.page),
                start_offset: chunk.start_offset,
            });
        }
    }
    out
}

/// Resets `collection`, then embeds and stores `chunks` in batches.
pub async fn index_chunks(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    collection: &str,
    chunks: Vec<StoredChunk>,
    batch_size: usize,
) -> Result<usize> {
    store.reset(collection, embedder.model()).await?;

    let total = chunks.len();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb.set_message(format!("Embedding with {}", embedder.model()));

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder
            .embed(&texts)
            .await
            .context("Failed to embed document chunks")?;
        let items = batch.iter().cloned().zip(vectors).collect();
        store
            .insert_batch(collection, items)
            .await
            .context("Failed to store document chunks")?;
        pb.inc(batch.len() as u64);
    }
    pb.finish_with_message("Embeddings stored");

    Ok(total)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub query: String,
    pub k: usize,
    pub hits: Vec<ChunkSearchResult>,
}

#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub collection: String,
    pub count: usize,
    pub embedding_model: Option<String>,
    pub results: Vec<ProbeResult>,
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Collection: {}", self.collection)?;
        if let Some(model) = &self.embedding_model {
            writeln!(f, "Embedding model: {}", model)?;
        }
        writeln!(f, "Total document chunks in collection: {}", self.count)?;

        if self.count == 0 {
            writeln!(f, "Error: The vector store is empty.")?;
            return write!(
                f,
                "No documents have been loaded. Run `mortgage-chat ingest` to add documents."
            );
        }

        for (i, result) in self.results.iter().enumerate() {
            if i > 0 {
                writeln!(f, "\n{}", "-".repeat(80))?;
            }
            writeln!(f, "\nRunning query: '{}' (k={})", result.query, result.k)?;
            if result.hits.is_empty() {
                writeln!(
                    f,
                    "Query ran successfully, but no matching documents were found."
                )?;
                continue;
            }
            writeln!(f, "Found {} relevant document chunks:", result.hits.len())?;
            for (n, hit) in result.hits.iter().enumerate() {
                let page = hit
                    .chunk
                    .page
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "N/A".to_string());
                writeln!(
                    f,
                    "\n[Result {}] Source: {} | Page: {} | Score: {:.3}",
                    n + 1,
                    hit.chunk.source,
                    page,
                    hit.score
                )?;
                writeln!(f, "{}", hit.chunk.content)?;
            }
        }
        Ok(())
    }
}

/// Counts the collection and, when it has content, runs each query.
pub async fn probe_vector_store(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    collection: &str,
    queries: &[String],
    k: usize,
) -> Result<ProbeReport> {
    let count = store.count(collection).await?;
    let embedding_model = store.embedding_model(collection).await?;
    if let Some(stored) = &embedding_model {
        if stored != embedder.model() {
            tracing::warn!(
                "Collection was built with '{}' but the configured embedder is '{}'",
                stored,
                embedder.model()
            );
        }
    }

    let mut results = Vec::new();
    if count > 0 {
        for query in queries {
            let embedding = embedder.embed_query(query).await?;
            let hits = store.search(&embedding, k, collection).await?;
            results.push(ProbeResult {
                query: query.clone(),
                k,
                hits,
            });
        }
    }

    Ok(ProbeReport {
        collection: collection.to_string(),
        count,
        embedding_model,
        results,
    })
}
