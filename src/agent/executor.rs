use std::sync::Arc;

use super::prompt::build_system_prompt;
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;
use crate::db::models::{ChatMessage as StoredMessage, ChatMessageRole};
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::tools::Toolbox;

pub const ITERATION_LIMIT_MESSAGE: &str = "Agent stopped due to iteration limit or time limit.";
pub const EMPTY_ANSWER_MESSAGE: &str = "I'm sorry, I encountered an error.";

/// Final answer plus a little bookkeeping for logs and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub content: String,
    pub iterations: usize,
    pub tool_calls: usize,
}

/// Tool-calling loop: ask the model, run the tools it requests, feed the
/// results back, until it answers in plain text.
#[derive(Clone)]
pub struct Agent {
    llm: Arc<dyn LlmProvider>,
    tools: Toolbox,
    settings: LlmSettings,
    max_iterations: usize,
}

impl Agent {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        tools: Toolbox,
        settings: LlmSettings,
        max_iterations: usize,
    ) -> Self {
        Self {
            llm,
            tools,
            settings,
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    fn initial_messages(
        summary: Option<&str>,
        history: &[StoredMessage],
        question: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(build_system_prompt(summary)));
        for msg in history {
            messages.push(match msg.role {
                ChatMessageRole::User => ChatMessage::user(msg.content.clone()),
                ChatMessageRole::Ai => ChatMessage::assistant(msg.content.clone()),
            });
        }
        messages.push(ChatMessage::user(question));
        messages
    }

    pub async fn run(
        &self,
        summary: Option<&str>,
        history: &[StoredMessage],
        question: &str,
    ) -> Result<AgentReply, ApiError> {
        let mut messages = Self::initial_messages(summary, history, question);
        let definitions = self.tools.definitions();
        let mut tool_calls = 0usize;

        for iteration in 1..=self.max_iterations {
            let request = ChatRequest::new(messages.clone())
                .with_tools(definitions.clone())
                .with_settings(&self.settings);
            let completion = self.llm.chat(request, &self.settings.chat_model).await?;

            if completion.tool_calls.is_empty() {
                let content = completion.content_or_empty().trim();
                let content = if content.is_empty() {
                    tracing::warn!("Model returned an empty answer");
                    EMPTY_ANSWER_MESSAGE.to_string()
                } else {
                    content.to_string()
                };
                return Ok(AgentReply {
                    content,
                    iterations: iteration,
                    tool_calls,
                });
            }

            let calls = completion.tool_calls.clone();
            messages.push(ChatMessage::assistant_tool_calls(
                completion.content,
                calls.clone(),
            ));
            for call in &calls {
                tool_calls += 1;
                let output = self
                    .tools
                    .execute(&call.function.name, &call.function.arguments)
                    .await;
                messages.push(ChatMessage::tool_result(call.id.clone(), output));
            }
        }

        tracing::warn!(
            "Agent hit the iteration limit ({}) after {} tool calls",
            self.max_iterations,
            tool_calls
        );
        Ok(AgentReply {
            content: ITERATION_LIMIT_MESSAGE.to_string(),
            iterations: self.max_iterations,
            tool_calls,
        })
    }
}
