//! Wire types of the chat and conversation endpoints.

use serde::{Deserialize, Serialize};

use crate::db::models::{ChatMessage, ChatMessageRole, Conversation};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationInfo {
    pub id: String,
    pub summary: Option<String>,
    pub created_at: String,
}

impl From<Conversation> for ConversationInfo {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            summary: c.summary,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInfo {
    pub id: String,
    pub role: ChatMessageRole,
    pub content: String,
    pub created_at: String,
}

impl From<ChatMessage> for MessageInfo {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            role: m.role,
            content: m.content,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub id: String,
    pub summary: Option<String>,
    pub created_at: String,
    pub messages: Vec<MessageInfo>,
}

impl ConversationDetail {
    pub fn new(conversation: Conversation, messages: Vec<ChatMessage>) -> Self {
        Self {
            id: conversation.id,
            summary: conversation.summary,
            created_at: conversation.created_at,
            messages: messages.into_iter().map(MessageInfo::from).collect(),
        }
    }
}
