//! SQLite conversation and message repository implementation.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use vendly_core::repository::conversation::ConversationRepository;
use vendly_types::chat::{ChatMessage, Conversation, Direction};
use vendly_types::error::RepositoryError;
use vendly_types::transport::MessageKind;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ConversationRepository`.
#[derive(Clone)]
pub struct SqliteConversationRepository {
    pool: DatabasePool,
}

impl SqliteConversationRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn conversation_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation, RepositoryError> {
    let id: String = get(row, "id")?;
    let customer_id: String = get(row, "customer_id")?;
    let account_id: String = get(row, "account_id")?;
    let active: i64 = get(row, "active")?;
    let started_at: String = get(row, "started_at")?;
    let last_message_at: String = get(row, "last_message_at")?;

    Ok(Conversation {
        id: parse_uuid(&id)?,
        customer_id: parse_uuid(&customer_id)?,
        account_id: parse_uuid(&account_id)?,
        active: active != 0,
        started_at: parse_datetime(&started_at)?,
        last_message_at: parse_datetime(&last_message_at)?,
    })
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage, RepositoryError> {
    let id: String = get(row, "id")?;
    let conversation_id: String = get(row, "conversation_id")?;
    let direction: String = get(row, "direction")?;
    let kind: String = get(row, "kind")?;
    let provider_id: Option<String> = get(row, "provider_id")?;
    let input_tokens: Option<i64> = get(row, "input_tokens")?;
    let output_tokens: Option<i64> = get(row, "output_tokens")?;
    let created_at: String = get(row, "created_at")?;

    Ok(ChatMessage {
        id: parse_uuid(&id)?,
        conversation_id: parse_uuid(&conversation_id)?,
        direction: direction
            .parse::<Direction>()
            .map_err(RepositoryError::Query)?,
        kind: kind.parse::<MessageKind>().map_err(RepositoryError::Query)?,
        content: get(row, "content")?,
        media_path: get(row, "media_path")?,
        provider_id: provider_id.as_deref().map(parse_uuid).transpose()?,
        input_tokens: input_tokens.map(|v| v as u32),
        output_tokens: output_tokens.map(|v| v as u32),
        created_at: parse_datetime(&created_at)?,
    })
}

fn get<'r, T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>>(
    row: &'r sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<T, RepositoryError> {
    row.try_get(column)
        .map_err(|e| RepositoryError::Query(e.to_string()))
}

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

// ---------------------------------------------------------------------------
// ConversationRepository impl
// ---------------------------------------------------------------------------

impl ConversationRepository for SqliteConversationRepository {
    async fn find_active(
        &self,
        customer_id: &Uuid,
        account_id: &Uuid,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT * FROM conversations
               WHERE customer_id = ? AND account_id = ? AND active = 1
               ORDER BY started_at DESC
               LIMIT 1"#,
        )
        .bind(customer_id.to_string())
        .bind(account_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    async fn create(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO conversations
               (id, customer_id, account_id, active, started_at, last_message_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(conversation.id.to_string())
        .bind(conversation.customer_id.to_string())
        .bind(conversation.account_id.to_string())
        .bind(conversation.active as i64)
        .bind(conversation.started_at.to_rfc3339())
        .bind(conversation.last_message_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn touch(&self, conversation_id: &Uuid) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE conversations SET last_message_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(conversation_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn save_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO messages
               (id, conversation_id, direction, kind, content, media_path,
                provider_id, input_tokens, output_tokens, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(message.id.to_string())
        .bind(message.conversation_id.to_string())
        .bind(message.direction.to_string())
        .bind(message.kind.to_string())
        .bind(&message.content)
        .bind(&message.media_path)
        .bind(message.provider_id.as_ref().map(|id| id.to_string()))
        .bind(message.input_tokens.map(|v| v as i64))
        .bind(message.output_tokens.map(|v| v as i64))
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn recent_messages(
        &self,
        conversation_id: &Uuid,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM messages
               WHERE conversation_id = ?
               ORDER BY created_at DESC, id DESC
               LIMIT ?"#,
        )
        .bind(conversation_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter().map(message_from_row).collect()
    }
}
