use chrono::SecondsFormat;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::models::{ChatMessage, ChatMessageRole, Conversation};
use crate::core::errors::ApiError;

/// Conversation and chat message persistence.
#[derive(Clone)]
pub struct ConversationStore {
    pool: SqlitePool,
}

pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl ConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the conversation for `conversation_id`, or creates a fresh one
    /// when the id is absent or unknown.
    pub async fn get_or_create(
        &self,
        conversation_id: Option<&str>,
    ) -> Result<Conversation, ApiError> {
        if let Some(id) = conversation_id.map(str::trim).filter(|id| !id.is_empty()) {
            if let Some(conversation) = self.get(id).await? {
                return Ok(conversation);
            }
            tracing::debug!("Conversation {} not found, starting a new one", id);
        }

        self.create().await
    }

    pub async fn create(&self) -> Result<Conversation, ApiError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_timestamp();

        sqlx::query("INSERT INTO conversation (id, created_at, summary) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(&now)
            .bind("")
            .execute(&self.pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create conversation: {}", e)))?;

        Ok(Conversation {
            id,
            user_id: None,
            created_at: now,
            updated_at: None,
            summary: Some(String::new()),
        })
    }

    pub async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>, ApiError> {
        let row = sqlx::query(
            "SELECT id, user_id, created_at, updated_at, summary FROM conversation WHERE id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_conversation))
    }

    /// All conversations, most recently active first.
    pub async fn list(&self) -> Result<Vec<Conversation>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, user_id, created_at, updated_at, summary \
             FROM conversation \
             ORDER BY COALESCE(updated_at, created_at) DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_conversation).collect())
    }

    pub async fn add_message(
        &self,
        conversation_id: &str,
        role: ChatMessageRole,
        content: &str,
    ) -> Result<ChatMessage, ApiError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO chat_message (id, conversation_id, role, content, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to save message: {}", e)))?;

        sqlx::query("UPDATE conversation SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ChatMessage {
            id,
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Every message of a conversation in chronological order.
    pub async fn messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, created_at \
             FROM chat_message WHERE conversation_id = ? \
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    /// The last `limit` messages, oldest first.
    pub async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, created_at FROM ( \
                 SELECT id, conversation_id, role, content, created_at, rowid AS seq \
                 FROM chat_message WHERE conversation_id = ? \
                 ORDER BY created_at DESC, rowid DESC LIMIT ? \
             ) ORDER BY created_at ASC, seq ASC",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    /// Replaces the rolling summary. Unknown ids are ignored.
    pub async fn update_summary(&self, conversation_id: &str, summary: &str) -> Result<(), ApiError> {
        sqlx::query("UPDATE conversation SET summary = ?, updated_at = ? WHERE id = ?")
            .bind(summary)
            .bind(now_timestamp())
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn message_count(&self, conversation_id: &str) -> Result<i64, ApiError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chat_message WHERE conversation_id = ?")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

fn row_to_conversation(row: &SqliteRow) -> Conversation {
    Conversation {
        id: row.try_get::<String, _>("id").unwrap_or_default(),
        user_id: row.try_get::<Option<String>, _>("user_id").unwrap_or(None),
        created_at: row.try_get::<String, _>("created_at").unwrap_or_default(),
        updated_at: row.try_get::<Option<String>, _>("updated_at").unwrap_or(None),
        summary: row.try_get::<Option<String>, _>("summary").unwrap_or(None),
    }
}

fn row_to_message(row: &SqliteRow) -> Result<ChatMessage, ApiError> {
    let role: String = row.try_get("role")?;
    Ok(ChatMessage {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        role: role.parse().map_err(ApiError::internal)?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::temp_database;

    #[tokio::test]
    async fn get_or_create_reuses_known_ids_and_creates_otherwise() {
        let (db, _dir) = temp_database().await;
        let store = db.conversations();

        let first = store.get_or_create(None).await.unwrap();
        let again = store.get_or_create(Some(&first.id)).await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(again.summary.as_deref(), Some(""));

        let unknown = store.get_or_create(Some("does-not-exist")).await.unwrap();
        assert_ne!(unknown.id, first.id);
        assert_ne!(unknown.id, "does-not-exist");
    }

    #[tokio::test]
    async fn recent_messages_are_bounded_and_chronological() {
        let (db, _dir) = temp_database().await;
        let store = db.conversations();
        let conversation = store.create().await.unwrap();

        for i in 0..5 {
            let role = if i % 2 == 0 {
                ChatMessageRole::User
            } else {
                ChatMessageRole::Ai
            };
            store
                .add_message(&conversation.id, role, &format!("m{}", i))
                .await
                .unwrap();
        }

        let recent = store.recent_messages(&conversation.id, 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
        assert_eq!(recent[0].role, ChatMessageRole::User);

        assert_eq!(store.messages(&conversation.id).await.unwrap().len(), 5);
        assert!(store.recent_messages(&conversation.id, 0).await.unwrap().is_empty());
        assert_eq!(store.message_count(&conversation.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn list_orders_by_latest_activity() {
        let (db, _dir) = temp_database().await;
        let store = db.conversations();

        let older = store.create().await.unwrap();
        let newer = store.create().await.unwrap();
        store
            .add_message(&older.id, ChatMessageRole::User, "bump")
            .await
            .unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].id, older.id);
        assert_eq!(listed[1].id, newer.id);
    }

    #[tokio::test]
    async fn update_summary_ignores_unknown_ids() {
        let (db, _dir) = temp_database().await;
        let store = db.conversations();
        let conversation = store.create().await.unwrap();

        store.update_summary(&conversation.id, "FICO 720, DSCR purchase").await.unwrap();
        store.update_summary("missing", "nothing").await.unwrap();

        let loaded = store.get(&conversation.id).await.unwrap().unwrap();
        assert_eq!(loaded.summary.as_deref(), Some("FICO 720, DSCR purchase"));
        assert!(store.get("missing").await.unwrap().is_none());
    }
}
