//! Message model and wire frames for the live channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::enums::Role;

/// A persisted chat message.
///
/// `id` is the per-chat sequence number assigned inside the append
/// transaction: monotonically increasing, no gaps, no duplicates. It is the
/// total order every subscriber observes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Message {
    /// Stored as `seq` (per-chat), exposed as `id` on the wire.
    #[sqlx(rename = "seq")]
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub sender_role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Client -> server frame on the persistent connection.
///
/// The first frame on a transport binds it to `chat_id`; an empty `content`
/// binds without producing a visible message. Later frames on the same
/// transport are assumed bound to that chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    pub chat_id: i64,
    pub content: String,
}

impl ClientFrame {
    /// Frame sent on open purely to subscribe the connection to a chat.
    pub fn bind(chat_id: i64) -> Self {
        Self {
            chat_id,
            content: String::new(),
        }
    }

    pub fn is_bind_only(&self) -> bool {
        self.content.trim().is_empty()
    }
}
