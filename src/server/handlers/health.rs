use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

pub async fn read_root() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "Welcome to the Mortgage Chatbot API!"
    }))
}
