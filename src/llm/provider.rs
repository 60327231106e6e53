use async_trait::async_trait;

use super::types::{ChatCompletion, ChatRequest};
use crate::core::errors::ApiError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// provider name used in logs (e.g. "groq")
    fn name(&self) -> &str;

    /// chat completion (non-streaming), with optional tool calling
    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<ChatCompletion, ApiError>;
}
