//! Chat lifecycle service: creation, assignment, closure, history

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{chat::{Chat, CreateChat}, message::Message, user::UserClaims},
    repository::Repository,
};

#[derive(Clone)]
pub struct ChatService {
    repository: Repository,
}

impl ChatService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Create a chat owned by the caller, in the `waiting` state
    pub async fn create_chat(&self, claims: &UserClaims, payload: CreateChat) -> AppResult<Chat> {
        payload
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        self.repository
            .chats
            .create(claims.user_id, &claims.name, payload.title.trim())
            .await
    }

    /// The caller's own chats
    pub async fn my_chats(&self, claims: &UserClaims) -> AppResult<Vec<Chat>> {
        self.repository.chats.list_for_patron(claims.user_id).await
    }

    /// Chats assigned to the calling librarian
    pub async fn assigned_chats(&self, claims: &UserClaims) -> AppResult<Vec<Chat>> {
        self.repository.chats.list_assigned_to(claims.user_id).await
    }

    /// Snapshot of the waiting queue. May be stale by the time a claim
    /// lands; `claim` re-validates against the store.
    pub async fn unassigned_chats(&self) -> AppResult<Vec<Chat>> {
        self.repository.chats.list_unassigned().await
    }

    /// Take ownership of a waiting chat. At most one of two racing claims
    /// succeeds; the loser gets `AlreadyAssigned`.
    pub async fn claim(&self, chat_id: i64, claims: &UserClaims) -> AppResult<Chat> {
        self.repository.chats.assign(chat_id, claims.user_id).await
    }

    /// Close an active chat. Closure is a barrier: no message accepted
    /// after it, enforced at the store.
    pub async fn close_chat(&self, chat_id: i64, claims: &UserClaims) -> AppResult<Chat> {
        self.repository.chats.close(chat_id, claims.user_id).await
    }

    /// Message history in persisted order. Readable by the owning patron
    /// and by librarians (who triage the waiting queue before claiming).
    pub async fn history(&self, chat_id: i64, claims: &UserClaims) -> AppResult<Vec<Message>> {
        let chat = self.repository.chats.get_by_id(chat_id).await?;
        if chat.patron_id != claims.user_id && !claims.is_librarian() {
            return Err(AppError::Authorization(
                "Not a participant of this chat".to_string(),
            ));
        }
        self.repository.messages.list(chat_id).await
    }

    /// Resolve a chat for a live subscription: the owning patron and the
    /// assigned librarian may bind a connection to it.
    pub async fn chat_for_subscription(
        &self,
        chat_id: i64,
        claims: &UserClaims,
    ) -> AppResult<Chat> {
        let chat = self.repository.chats.get_by_id(chat_id).await?;
        let is_owner = chat.patron_id == claims.user_id;
        let is_assignee = chat.librarian_id == Some(claims.user_id) && claims.is_librarian();
        if !is_owner && !is_assignee {
            return Err(AppError::Authorization(
                "Not a participant of this chat".to_string(),
            ));
        }
        Ok(chat)
    }
}
