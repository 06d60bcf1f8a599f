//! Repository layer for database operations

pub mod chats;
pub mod messages;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{enums::Role, message::Message},
};

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub chats: chats::ChatsRepository,
    pub messages: messages::MessagesRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            chats: chats::ChatsRepository::new(pool.clone()),
            messages: messages::MessagesRepository::new(pool.clone()),
            pool,
        }
    }
}

/// The append contract the session registry depends on.
///
/// The registry never talks to the pool directly; injecting the store this
/// way keeps fan-out logic testable against an in-memory implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append_message(
        &self,
        chat_id: i64,
        sender_id: i64,
        sender_name: &str,
        sender_role: Role,
        content: &str,
    ) -> AppResult<Message>;
}

#[async_trait]
impl MessageStore for Repository {
    async fn append_message(
        &self,
        chat_id: i64,
        sender_id: i64,
        sender_name: &str,
        sender_role: Role,
        content: &str,
    ) -> AppResult<Message> {
        self.messages
            .append(chat_id, sender_id, sender_name, sender_role, content)
            .await
    }
}
