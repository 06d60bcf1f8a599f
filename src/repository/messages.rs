//! Messages repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{enums::{ChatStatus, Role}, message::Message},
};

#[derive(Clone)]
pub struct MessagesRepository {
    pool: Pool<Postgres>,
}

impl MessagesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Append a message to a chat.
    ///
    /// Runs in a transaction that takes the chat row lock before anything
    /// else. The lock is the close barrier: an append racing a close
    /// serializes behind it and observes `closed`, so no message is ever
    /// persisted after closure. The same lock makes the per-chat `seq`
    /// gapless, since no two appends to one chat compute it concurrently.
    pub async fn append(
        &self,
        chat_id: i64,
        sender_id: i64,
        sender_name: &str,
        sender_role: Role,
        content: &str,
    ) -> AppResult<Message> {
        if content.trim().is_empty() {
            return Err(AppError::EmptyContent);
        }

        let mut tx = self.pool.begin().await?;

        let status: Option<ChatStatus> =
            sqlx::query_scalar("SELECT status FROM chats WHERE id = $1 FOR UPDATE")
                .bind(chat_id)
                .fetch_optional(&mut *tx)
                .await?;

        let status = status
            .ok_or_else(|| AppError::NotFound(format!("Chat with id {} not found", chat_id)))?;

        if status == ChatStatus::Closed {
            return Err(AppError::ChatClosed);
        }

        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO chat_messages (chat_id, seq, sender_id, sender_name, sender_role, content)
            SELECT $1, COALESCE(MAX(seq), 0) + 1, $2, $3, $4, $5
            FROM chat_messages WHERE chat_id = $1
            RETURNING *
            "#,
        )
        .bind(chat_id)
        .bind(sender_id)
        .bind(sender_name)
        .bind(sender_role)
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(message)
    }

    /// Full message history for a chat, in persisted order
    pub async fn list(&self, chat_id: i64) -> AppResult<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM chat_messages WHERE chat_id = $1 ORDER BY seq ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }
}
