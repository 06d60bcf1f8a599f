//! Chats repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{chat::Chat, enums::ChatStatus},
};

#[derive(Clone)]
pub struct ChatsRepository {
    pool: Pool<Postgres>,
}

impl ChatsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get chat by ID
    pub async fn get_by_id(&self, id: i64) -> AppResult<Chat> {
        sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Chat with id {} not found", id)))
    }

    /// Create a new chat in the `waiting` state
    pub async fn create(&self, patron_id: i64, user_name: &str, title: &str) -> AppResult<Chat> {
        let chat = sqlx::query_as::<_, Chat>(
            r#"
            INSERT INTO chats (title, patron_id, user_name, status)
            VALUES ($1, $2, $3, 'waiting')
            RETURNING *
            "#,
        )
        .bind(title)
        .bind(patron_id)
        .bind(user_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(chat)
    }

    /// Chats owned by a patron, newest first
    pub async fn list_for_patron(&self, patron_id: i64) -> AppResult<Vec<Chat>> {
        let chats = sqlx::query_as::<_, Chat>(
            "SELECT * FROM chats WHERE patron_id = $1 ORDER BY created_at DESC",
        )
        .bind(patron_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(chats)
    }

    /// Waiting chats nobody has claimed yet, oldest first (queue order).
    /// The result is a snapshot; callers must treat it as potentially
    /// stale by the time they claim.
    pub async fn list_unassigned(&self) -> AppResult<Vec<Chat>> {
        let chats = sqlx::query_as::<_, Chat>(
            "SELECT * FROM chats WHERE status = 'waiting' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(chats)
    }

    /// Chats assigned to a librarian (active and closed), newest first
    pub async fn list_assigned_to(&self, librarian_id: i64) -> AppResult<Vec<Chat>> {
        let chats = sqlx::query_as::<_, Chat>(
            "SELECT * FROM chats WHERE librarian_id = $1 ORDER BY created_at DESC",
        )
        .bind(librarian_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(chats)
    }

    /// Atomically bind a librarian to a waiting chat.
    ///
    /// The check-and-set is a single UPDATE guarded on `status = 'waiting'`:
    /// when two librarians race, exactly one statement matches the row and
    /// the loser observes `AlreadyAssigned`.
    pub async fn assign(&self, chat_id: i64, librarian_id: i64) -> AppResult<Chat> {
        let updated = sqlx::query_as::<_, Chat>(
            r#"
            UPDATE chats
            SET status = 'active', librarian_id = $2
            WHERE id = $1 AND status = 'waiting'
            RETURNING *
            "#,
        )
        .bind(chat_id)
        .bind(librarian_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(chat) => Ok(chat),
            // Disambiguate: a missing row is NotFound, an existing row lost
            // the race (or was already active/closed).
            None => {
                self.get_by_id(chat_id).await?;
                Err(AppError::AlreadyAssigned)
            }
        }
    }

    /// Close an active chat. Only the assigned librarian may close, and
    /// the transition is atomic for the same reason `assign` is.
    pub async fn close(&self, chat_id: i64, librarian_id: i64) -> AppResult<Chat> {
        let updated = sqlx::query_as::<_, Chat>(
            r#"
            UPDATE chats
            SET status = 'closed'
            WHERE id = $1 AND status = 'active' AND librarian_id = $2
            RETURNING *
            "#,
        )
        .bind(chat_id)
        .bind(librarian_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(chat) => Ok(chat),
            None => {
                let chat = self.get_by_id(chat_id).await?;
                if chat.status == ChatStatus::Active {
                    Err(AppError::Authorization(
                        "Only the assigned librarian may close this chat".to_string(),
                    ))
                } else {
                    Err(AppError::NotActive)
                }
            }
        }
    }
}
