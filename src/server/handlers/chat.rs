use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::chat::{ChatRequest, ChatResponse};
use crate::core::errors::ApiError;
use crate::state::AppState;

/// Runs one chat turn. Anything but a rejected request surfaces as a 500.
pub async fn chat_with_agent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    match state.chat.process_chat_message(payload).await {
        Ok(response) => Ok(Json(response)),
        Err(err @ ApiError::BadRequest(_)) => Err(err),
        Err(err) => {
            tracing::error!("Chat processing failed: {}", err);
            Err(ApiError::Internal(err.detail().to_string()))
        }
    }
}
