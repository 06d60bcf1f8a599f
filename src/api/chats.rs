//! Support chat endpoints (REST side)
//!
//! These are the request/response operations on the Message Store; live
//! delivery goes over the persistent connection in [`super::ws`].

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{chat::{Chat, CreateChat}, message::Message},
};

use super::AuthenticatedUser;

/// List the caller's own chats
#[utoipa::path(
    get,
    path = "/chats",
    tag = "chats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's chats, newest first", body = Vec<Chat>)
    )
)]
pub async fn list_my_chats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Chat>>> {
    let chats = state.services.chats.my_chats(&claims).await?;
    Ok(Json(chats))
}

/// Create a new support chat
#[utoipa::path(
    post,
    path = "/chats",
    tag = "chats",
    security(("bearer_auth" = [])),
    request_body = CreateChat,
    responses(
        (status = 201, description = "Chat created in the waiting state", body = Chat),
        (status = 400, description = "Invalid title")
    )
)]
pub async fn create_chat(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateChat>,
) -> AppResult<(StatusCode, Json<Chat>)> {
    let chat = state.services.chats.create_chat(&claims, request).await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

/// Full message history for a chat
#[utoipa::path(
    get,
    path = "/chats/{id}/messages",
    tag = "chats",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Chat ID")
    ),
    responses(
        (status = 200, description = "Messages in persisted order", body = Vec<Message>),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Chat not found")
    )
)]
pub async fn list_messages(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(chat_id): Path<i64>,
) -> AppResult<Json<Vec<Message>>> {
    let messages = state.services.chats.history(chat_id, &claims).await?;
    Ok(Json(messages))
}

/// Chats assigned to the calling librarian
#[utoipa::path(
    get,
    path = "/librarian/chats",
    tag = "librarian",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Assigned chats", body = Vec<Chat>),
        (status = 403, description = "Caller is not a librarian")
    )
)]
pub async fn list_assigned_chats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Chat>>> {
    claims.require_librarian()?;

    let chats = state.services.chats.assigned_chats(&claims).await?;
    Ok(Json(chats))
}

/// Waiting chats nobody has claimed yet
#[utoipa::path(
    get,
    path = "/librarian/chats/unassigned",
    tag = "librarian",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Unclaimed chats in queue order", body = Vec<Chat>),
        (status = 403, description = "Caller is not a librarian")
    )
)]
pub async fn list_unassigned_chats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Chat>>> {
    claims.require_librarian()?;

    let chats = state.services.chats.unassigned_chats().await?;
    Ok(Json(chats))
}

/// Claim a waiting chat
#[utoipa::path(
    post,
    path = "/librarian/chats/{id}/assign",
    tag = "librarian",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Chat ID")
    ),
    responses(
        (status = 200, description = "Chat claimed", body = Chat),
        (status = 403, description = "Caller is not a librarian"),
        (status = 404, description = "Chat not found"),
        (status = 409, description = "Another librarian claimed it first")
    )
)]
pub async fn assign_chat(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(chat_id): Path<i64>,
) -> AppResult<Json<Chat>> {
    claims.require_librarian()?;

    let chat = state.services.chats.claim(chat_id, &claims).await?;
    Ok(Json(chat))
}

/// Close an active chat
#[utoipa::path(
    post,
    path = "/librarian/chats/{id}/close",
    tag = "librarian",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Chat ID")
    ),
    responses(
        (status = 200, description = "Chat closed", body = Chat),
        (status = 403, description = "Caller is not the assigned librarian"),
        (status = 404, description = "Chat not found"),
        (status = 409, description = "Chat is not active")
    )
)]
pub async fn close_chat(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(chat_id): Path<i64>,
) -> AppResult<Json<Chat>> {
    claims.require_librarian()?;

    let chat = state.services.chats.close_chat(chat_id, &claims).await?;
    Ok(Json(chat))
}
