//! Chat model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::enums::ChatStatus;

/// Chat model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Chat {
    pub id: i64,
    pub title: String,
    /// Owning patron, set at creation, immutable.
    pub patron_id: i64,
    /// Patron display name, captured from the creator's claims.
    pub user_name: String,
    /// Owning librarian; unset while the chat is waiting, set exactly once
    /// on assignment.
    pub librarian_id: Option<i64>,
    pub status: ChatStatus,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// `status = waiting` iff no librarian is bound.
    pub fn invariant_holds(&self) -> bool {
        (self.status == ChatStatus::Waiting) == self.librarian_id.is_none()
    }
}

/// Create chat request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateChat {
    /// Subject line shown in both sidebars
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(status: ChatStatus, librarian_id: Option<i64>) -> Chat {
        Chat {
            id: 1,
            title: "Overdue fine".to_string(),
            patron_id: 10,
            user_name: "Anna".to_string(),
            librarian_id,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn waiting_chat_has_no_librarian() {
        assert!(chat(ChatStatus::Waiting, None).invariant_holds());
        assert!(!chat(ChatStatus::Waiting, Some(7)).invariant_holds());
    }

    #[test]
    fn assigned_states_require_librarian() {
        assert!(chat(ChatStatus::Active, Some(7)).invariant_holds());
        assert!(chat(ChatStatus::Closed, Some(7)).invariant_holds());
        assert!(!chat(ChatStatus::Active, None).invariant_holds());
        assert!(!chat(ChatStatus::Closed, None).invariant_holds());
    }
}
