pub mod service;
pub mod settings;
pub mod validation;

pub use service::ConfigService;
pub use settings::{
    AgentSettings, EmbeddingBackend, EmbeddingSettings, IngestSettings, LlmSettings,
    LoggingSettings, ServerSettings, Settings, VectorStoreSettings,
};
