//! Error types for BiblioDesk server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Assignment race lost: another librarian claimed the chat first.
    #[error("Chat is already assigned")]
    AlreadyAssigned,

    /// Send attempted after closure; the message is never persisted.
    #[error("Chat is closed")]
    ChatClosed,

    /// Close attempted on a chat that is not active.
    #[error("Chat is not active")]
    NotActive,

    #[error("Message content must not be empty")]
    EmptyContent,

    /// Send on a connection that is not bound to the chat.
    #[error("Connection is not bound to this chat")]
    NotBound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable wire code. Clients branch on these, so they never change.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Authentication(_) | AppError::Authorization(_) => "not_authorized",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "bad_value",
            AppError::AlreadyAssigned => "already_assigned",
            AppError::ChatClosed => "chat_closed",
            AppError::NotActive => "not_active",
            AppError::EmptyContent => "empty_content",
            AppError::NotBound => "not_bound",
            AppError::Database(_) => "db_failure",
            AppError::Internal(_) => "failure",
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let message = match err {
            // Never leak database internals to the wire
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        Self {
            error: err.code().to_string(),
            message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::EmptyContent | AppError::NotBound => {
                StatusCode::BAD_REQUEST
            }
            AppError::AlreadyAssigned | AppError::ChatClosed | AppError::NotActive => {
                StatusCode::CONFLICT
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::from(&self));

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
