//! Document retrieval: PDF loading, text splitting, the SQLite vector store
//! and the ingestion/probe pipelines built on them.

pub mod ingest;
pub mod pdf;
pub mod splitter;
pub mod sqlite;
pub mod store;

pub use ingest::{build_vector_store, probe_vector_store, IngestReport, ProbeReport};
pub use splitter::{TextChunk, TextSplitter};
pub use sqlite::SqliteVectorStore;
pub use store::{ChunkSearchResult, StoredChunk, VectorStore};
