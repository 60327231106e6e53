pub mod embeddings;
pub mod groq;
pub mod provider;
pub mod types;

pub use embeddings::{Embedder, HashedEmbedder, OpenAiEmbedder};
pub use groq::GroqProvider;
pub use provider::LlmProvider;
pub use types::{ChatCompletion, ChatMessage, ChatRequest, ToolCall, ToolDefinition};
