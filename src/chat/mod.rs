//! Conversation service: persists the exchange around each agent run and
//! keeps the rolling summary up to date.

use crate::agent::Agent;
use crate::core::config::AgentSettings;
use crate::core::errors::ApiError;
use crate::db::models::{ChatMessage, ChatMessageRole};
use crate::db::Database;
use crate::llm;

pub mod schemas;

pub use schemas::{ChatRequest, ChatResponse, ConversationDetail, ConversationInfo, MessageInfo};

const SUMMARY_INSTRUCTIONS: &str = "Concisely summarize the following conversation, focusing on key loan parameters, user preferences, and products discussed.";

/// When the summary is refreshed after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryRefresh {
    /// Detached task; the reply does not wait for it.
    Background,
    /// Awaited before the reply is returned.
    Inline,
}

#[derive(Clone)]
pub struct ChatService {
    db: Database,
    agent: Agent,
    history_limit: i64,
    summary_window: i64,
    summary_refresh: SummaryRefresh,
}

impl ChatService {
    pub fn new(db: Database, agent: Agent, settings: &AgentSettings) -> Self {
        Self {
            db,
            agent,
            history_limit: settings.history_limit,
            summary_window: settings.summary_window,
            summary_refresh: SummaryRefresh::Background,
        }
    }

    pub fn with_summary_refresh(mut self, mode: SummaryRefresh) -> Self {
        self.summary_refresh = mode;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub async fn process_chat_message(&self, request: ChatRequest) -> Result<ChatResponse, ApiError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(ApiError::BadRequest("Message must not be empty".to_string()));
        }

        let store = self.db.conversations();
        let conversation = store
            .get_or_create(request.conversation_id.as_deref())
            .await?;
        let history = store
            .recent_messages(&conversation.id, self.history_limit)
            .await?;
        store
            .add_message(&conversation.id, ChatMessageRole::User, message)
            .await?;

        tracing::info!(
            "Chat turn for conversation {} ({} history messages)",
            conversation.id,
            history.len()
        );
        let reply = self
            .agent
            .run(conversation.summary.as_deref(), &history, message)
            .await?;
        tracing::debug!(
            "Agent answered after {} iteration(s) and {} tool call(s)",
            reply.iterations,
            reply.tool_calls
        );

        store
            .add_message(&conversation.id, ChatMessageRole::Ai, &reply.content)
            .await?;

        match self.summary_refresh {
            SummaryRefresh::Background => {
                let service = self.clone();
                let conversation_id = conversation.id.clone();
                tokio::spawn(async move {
                    service.refresh_summary(&conversation_id).await;
                });
            }
            SummaryRefresh::Inline => self.refresh_summary(&conversation.id).await,
        }

        Ok(ChatResponse {
            response: reply.content,
            conversation_id: conversation.id,
        })
    }

    /// Re-summarises the latest messages. Failures are logged and dropped.
    pub async fn refresh_summary(&self, conversation_id: &str) {
        if let Err(e) = self.try_refresh_summary(conversation_id).await {
            tracing::warn!("Error updating summary for {}: {}", conversation_id, e);
        }
    }

    async fn try_refresh_summary(&self, conversation_id: &str) -> Result<(), ApiError> {
        let store = self.db.conversations();
        let recent = store
            .recent_messages(conversation_id, self.summary_window)
            .await?;
        if recent.is_empty() {
            return Ok(());
        }

        let prompt = summary_prompt(&recent);
        let request = llm::ChatRequest::new(vec![llm::ChatMessage::user(prompt)])
            .with_settings(self.agent.settings());
        let completion = self
            .agent
            .llm()
            .chat(request, &self.agent.settings().chat_model)
            .await?;

        let summary = completion.content_or_empty().trim();
        if summary.is_empty() {
            tracing::debug!("Summary model returned nothing for {}", conversation_id);
            return Ok(());
        }
        store.update_summary(conversation_id, summary).await
    }
}

fn summary_prompt(messages: &[ChatMessage]) -> String {
    let history = messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}\n\nConversation:\n{}\n\nSummary:",
        SUMMARY_INSTRUCTIONS, history
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::config::LlmSettings;
    use crate::db::import::{fixtures::sample_catalog, import_records};
    use crate::db::testing::temp_database;
    use crate::llm::provider::scripted::ScriptedProvider;
    use crate::llm::ChatCompletion;
    use crate::tools::Toolbox;

    async fn service_with(
        replies: Vec<Result<ChatCompletion, ApiError>>,
    ) -> (ChatService, Arc<ScriptedProvider>, tempfile::TempDir) {
        let (db, dir) = temp_database().await;
        import_records(&db, &sample_catalog()).await.unwrap();
        let llm = Arc::new(ScriptedProvider::new(replies));
        let settings = AgentSettings::default();
        let tools = Toolbox::new(db.clone(), llm.clone(), LlmSettings::default(), &settings, None);
        let agent = Agent::new(llm.clone(), tools, LlmSettings::default(), settings.max_iterations);
        let service =
            ChatService::new(db, agent, &settings).with_summary_refresh(SummaryRefresh::Inline);
        (service, llm, dir)
    }

    #[test]
    fn summary_prompt_lists_roles() {
        let msg = |role, content: &str| ChatMessage {
            id: "m".to_string(),
            conversation_id: "c".to_string(),
            role,
            content: content.to_string(),
            created_at: String::new(),
        };
        let prompt = summary_prompt(&[
            msg(ChatMessageRole::User, "DSCR at 700?"),
            msg(ChatMessageRole::Ai, "Max LTV 75%."),
        ]);
        assert!(prompt.starts_with("Concisely summarize the following conversation"));
        assert!(prompt.ends_with("Conversation:\nUSER: DSCR at 700?\nAI: Max LTV 75%.\n\nSummary:"));
    }

    #[tokio::test]
    async fn turn_is_persisted_and_summarised() {
        let (service, llm, _dir) = service_with(vec![
            Ok(ChatCompletion::text("We work with NQM Funding.")),
            Ok(ChatCompletion::text("User asked about lenders.")),
        ])
        .await;

        let reply = service
            .process_chat_message(ChatRequest {
                message: "Who are your lenders?".to_string(),
                conversation_id: None,
            })
            .await
            .unwrap();

        assert_eq!(reply.response, "We work with NQM Funding.");
        let store = service.db().conversations();
        let messages = store.messages(&reply.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatMessageRole::User);
        assert_eq!(messages[1].content, "We work with NQM Funding.");

        let conversation = store.get(&reply.conversation_id).await.unwrap().unwrap();
        assert_eq!(conversation.summary.as_deref(), Some("User asked about lenders."));
        assert_eq!(llm.request_count(), 2);
    }

    #[tokio::test]
    async fn follow_up_sees_history_and_summary() {
        let (service, llm, _dir) = service_with(vec![
            Ok(ChatCompletion::text("first answer")),
            Ok(ChatCompletion::text("Talking about DSCR Plus.")),
            Ok(ChatCompletion::text("second answer")),
            Ok(ChatCompletion::text("Still DSCR Plus.")),
        ])
        .await;

        let first = service
            .process_chat_message(ChatRequest {
                message: "Tell me about DSCR Plus".to_string(),
                conversation_id: None,
            })
            .await
            .unwrap();
        let second = service
            .process_chat_message(ChatRequest {
                message: "And the reserves?".to_string(),
                conversation_id: Some(first.conversation_id.clone()),
            })
            .await
            .unwrap();

        assert_eq!(second.conversation_id, first.conversation_id);
        let requests = llm.requests.lock().unwrap();
        let agent_messages = &requests[2].messages;
        let roles: Vec<&str> = agent_messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert!(agent_messages[0]
            .content
            .as_deref()
            .unwrap()
            .contains("Talking about DSCR Plus."));
        assert_eq!(agent_messages[3].content.as_deref(), Some("And the reserves?"));
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let (service, llm, _dir) = service_with(Vec::new()).await;
        let err = service
            .process_chat_message(ChatRequest {
                message: "   ".to_string(),
                conversation_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(llm.request_count(), 0);
    }

    #[tokio::test]
    async fn summary_failure_does_not_fail_the_turn() {
        let (service, _llm, _dir) = service_with(vec![
            Ok(ChatCompletion::text("answer")),
            Err(ApiError::Upstream("rate limited".to_string())),
        ])
        .await;

        let reply = service
            .process_chat_message(ChatRequest {
                message: "hi".to_string(),
                conversation_id: None,
            })
            .await
            .unwrap();

        let conversation = service
            .db()
            .conversations()
            .get(&reply.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.summary.as_deref(), Some(""));
    }
}
