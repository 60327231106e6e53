use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::chat::{ConversationDetail, ConversationInfo};
use crate::core::errors::ApiError;
use crate::state::AppState;

/// All conversations, most recent first.
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ConversationInfo>>, ApiError> {
    let conversations = state.db.conversations().list().await?;
    Ok(Json(
        conversations.into_iter().map(ConversationInfo::from).collect(),
    ))
}

pub async fn get_conversation_details(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let store = state.db.conversations();
    let conversation = store
        .get(&conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    let messages = store.messages(&conversation_id).await?;
    Ok(Json(ConversationDetail::new(conversation, messages)))
}
