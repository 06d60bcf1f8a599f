//! In-memory session registry for live chat connections.
//!
//! One room per chat id, holding the subscriber set. The room mutex is the
//! serialization point for everything that touches a chat at runtime:
//! `publish` holds it across persistence *and* fan-out, so the order
//! messages land in the store is exactly the order every subscriber
//! observes, and the subscriber set is always consistent with what was
//! just persisted. Unrelated chats never contend.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{message::Message, user::UserClaims},
    repository::MessageStore,
};

/// Unique identifier for a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscriber set for one chat.
#[derive(Default)]
struct ChatRoom {
    subscribers: HashMap<ConnectionId, mpsc::Sender<String>>,
}

/// Registry of live chat rooms. Constructed once per process and passed
/// explicitly to connection handlers; there is no global instance.
pub struct SessionRegistry {
    rooms: DashMap<i64, Arc<Mutex<ChatRoom>>>,
    store: Arc<dyn MessageStore>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            rooms: DashMap::new(),
            store,
        }
    }

    /// Bind a connection to a chat. The room is created on first
    /// subscriber.
    pub async fn subscribe(&self, chat_id: i64, connection_id: ConnectionId, tx: mpsc::Sender<String>) {
        let room = self
            .rooms
            .entry(chat_id)
            .or_insert_with(|| Arc::new(Mutex::new(ChatRoom::default())))
            .clone();
        room.lock().await.subscribers.insert(connection_id, tx);

        tracing::debug!(chat_id, connection_id = %connection_id, "Connection subscribed");
    }

    /// Remove a connection from a chat's room. Idempotent; the room itself
    /// is dropped once its last subscriber leaves.
    pub async fn unsubscribe(&self, chat_id: i64, connection_id: ConnectionId) {
        let Some(room) = self.rooms.get(&chat_id).map(|e| Arc::clone(e.value())) else {
            return;
        };

        let empty = {
            let mut room = room.lock().await;
            room.subscribers.remove(&connection_id);
            room.subscribers.is_empty()
        };

        if empty {
            // Re-check emptiness under the lock; a new subscriber may have
            // arrived between the unlock above and this removal.
            self.rooms.remove_if(&chat_id, |_, r| {
                r.try_lock()
                    .map(|g| g.subscribers.is_empty())
                    .unwrap_or(false)
            });
        }

        tracing::debug!(chat_id, connection_id = %connection_id, "Connection unsubscribed");
    }

    /// Persist a message and fan it out to every connection bound to the
    /// chat.
    ///
    /// The room lock is held from before the store call until fan-out
    /// completes: concurrent sends to one chat are linearized into the
    /// persisted order, and a message that fails to persist reaches no
    /// subscriber. Cost is O(subscribers of this chat).
    pub async fn publish(
        &self,
        chat_id: i64,
        connection_id: ConnectionId,
        claims: &UserClaims,
        content: &str,
    ) -> AppResult<Message> {
        if content.trim().is_empty() {
            return Err(AppError::EmptyContent);
        }

        let room = self
            .rooms
            .get(&chat_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(AppError::NotBound)?;

        let mut room = room.lock().await;

        // A connection that was torn down concurrently is a stale handle.
        if !room.subscribers.contains_key(&connection_id) {
            return Err(AppError::NotBound);
        }

        let message = self
            .store
            .append_message(chat_id, claims.user_id, &claims.name, claims.role, content)
            .await?;

        let frame = serde_json::to_string(&message)
            .map_err(|e| AppError::Internal(format!("Failed to encode message frame: {}", e)))?;

        let mut dead = Vec::new();
        for (id, tx) in room.subscribers.iter() {
            match tx.try_send(frame.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Slow consumer; it will recover the gap from history
                    // on its next reconnect.
                    tracing::warn!(
                        chat_id,
                        connection_id = %id,
                        "Send queue full, dropping frame"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
            }
        }
        for id in dead {
            room.subscribers.remove(&id);
        }

        Ok(message)
    }

    /// Number of connections currently bound to a chat.
    pub async fn subscriber_count(&self, chat_id: i64) -> usize {
        match self.rooms.get(&chat_id).map(|e| Arc::clone(e.value())) {
            Some(room) => room.lock().await.subscribers.len(),
            None => 0,
        }
    }
}
