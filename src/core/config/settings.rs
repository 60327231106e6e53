use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8085;
pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_CHAT_MODEL: &str = "openai/gpt-oss-20b";

/// Fully resolved application settings.
///
/// Every section has defaults so that a YAML file or the environment only
/// needs to carry the values that differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub server: ServerSettings,
    pub llm: LlmSettings,
    pub embeddings: EmbeddingSettings,
    pub vector_store: VectorStoreSettings,
    pub agent: AgentSettings,
    pub ingest: IngestSettings,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            server: ServerSettings::default(),
            llm: LlmSettings::default(),
            embeddings: EmbeddingSettings::default(),
            vector_store: VectorStoreSettings::default(),
            agent: AgentSettings::default(),
            ingest: IngestSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub groq_api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub sql_model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            base_url: DEFAULT_GROQ_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            sql_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: None,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Any OpenAI-compatible `/embeddings` endpoint (Ollama, LM Studio, ...).
    Openai,
    /// Local feature-hashing embedder, no network.
    Hashed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub api_url: String,
    pub api_key: Option<String>,
    pub dimensions: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Openai,
            model: "nomic-embed-text".to_string(),
            api_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            dimensions: 384,
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    pub dir: PathBuf,
    pub collection_name: String,
}

impl VectorStoreSettings {
    pub fn db_path(&self) -> PathBuf {
        self.dir.join("vectors.db")
    }
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("vstore"),
            collection_name: "mortgage_guidelines".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub history_limit: i64,
    pub summary_window: i64,
    pub fuzzy_threshold: u8,
    pub document_k: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            history_limit: 10,
            summary_window: 6,
            fuzzy_threshold: 85,
            document_k: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub pdf_dir: PathBuf,
    pub data_file: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            pdf_dir: PathBuf::from("pdf"),
            data_file: PathBuf::from("data.json"),
            chunk_size: 1500,
            chunk_overlap: 150,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub log_dir: PathBuf,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}
