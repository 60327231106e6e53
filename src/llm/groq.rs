use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::provider::LlmProvider;
use super::types::{ChatCompletion, ChatMessage, ChatRequest};
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;

/// Groq's OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct GroqProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

impl GroqProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    /// Fails when no API key is configured; nothing works without one.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, ApiError> {
        let api_key = settings
            .groq_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                ApiError::ServiceUnavailable("GROQ_API_KEY is required".to_string())
            })?;
        Self::new(
            &settings.base_url,
            api_key,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    fn build_body(request: &ChatRequest, model_id: &str) -> Value {
        let mut body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
            if !request.tools.is_empty() {
                let tools: Vec<Value> = request.tools.iter().map(|t| t.to_wire()).collect();
                obj.insert("tools".to_string(), Value::Array(tools));
                obj.insert("tool_choice".to_string(), json!("auto"));
            }
        }

        body
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

#[async_trait]
impl LlmProvider for GroqProvider {
    fn name(&self) -> &str {
        "groq"
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<ChatCompletion, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_body(&request, model_id);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Groq request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "Groq chat error ({}): {}",
                status, text
            )));
        }

        let payload: CompletionResponse = res
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("Malformed Groq response: {}", e)))?;

        let message = payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ApiError::Upstream("Groq returned no choices".to_string()))?;

        Ok(ChatCompletion {
            content: message.content,
            tool_calls: message.tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{ToolCall, ToolDefinition};

    #[test]
    fn body_includes_tools_only_when_present() {
        let request = ChatRequest::new(vec![ChatMessage::user("hi")]);
        let body = GroqProvider::build_body(&request, "openai/gpt-oss-20b");
        assert_eq!(body["model"], "openai/gpt-oss-20b");
        assert!(body.get("tools").is_none());

        let request = request.with_tools(vec![ToolDefinition {
            name: "get_available_lenders".to_string(),
            description: "List lenders".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }]);
        let body = GroqProvider::build_body(&request, "m");
        assert_eq!(body["tools"][0]["function"]["name"], "get_available_lenders");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn tool_call_messages_serialize_in_openai_shape() {
        let call = ToolCall::new("call_1", "get_program_guidelines", json!({"program_name": "DSCR"}));
        let message = ChatMessage::assistant_tool_calls(None, vec![call]);
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], Value::Null);
        assert_eq!(value["tool_calls"][0]["type"], "function");
        assert_eq!(
            value["tool_calls"][0]["function"]["arguments"],
            "{\"program_name\":\"DSCR\"}"
        );

        let result = serde_json::to_value(ChatMessage::tool_result("call_1", "ok")).unwrap();
        assert_eq!(result["tool_call_id"], "call_1");
        assert!(result.get("tool_calls").is_none());
    }

    #[test]
    fn response_with_tool_calls_deserializes() {
        let raw = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "get_available_lenders", "arguments": "{}"}
                    }]
                }
            }]
        });
        let parsed: CompletionResponse = serde_json::from_value(raw).unwrap();
        let message = &parsed.choices[0].message;
        assert!(message.content.is_none());
        assert_eq!(message.tool_calls[0].function.name, "get_available_lenders");
    }

    #[test]
    fn null_tool_calls_parse_as_plain_answer() {
        let raw = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Hello.", "tool_calls": null}
            }]
        });
        let parsed: CompletionResponse = serde_json::from_value(raw).unwrap();
        let message = &parsed.choices[0].message;
        assert_eq!(message.content.as_deref(), Some("Hello."));
        assert!(message.tool_calls.is_empty());
    }

    #[test]
    fn missing_api_key_is_reported() {
        let settings = LlmSettings::default();
        let err = GroqProvider::from_settings(&settings).err().unwrap();
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }
}
