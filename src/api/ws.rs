//! Persistent connection endpoint for live message delivery.
//!
//! One WebSocket per client, bound to exactly one chat for its lifetime.
//! The first client frame `{chat_id, content}` declares the chat; an empty
//! `content` binds without producing a message. Rebinding requires a new
//! connection. Server frames are either a persisted message or an
//! `ErrorResponse` addressed to the offending sender only.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    error::{AppError, ErrorResponse},
    models::{message::ClientFrame, user::UserClaims},
    services::registry::ConnectionId,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let claims = super::claims_for_handshake(
        &headers,
        query.token.as_deref(),
        &state.config.auth.jwt_secret,
    )?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, claims)))
}

/// Drive one connection: bind on first frame, then relay sends until the
/// transport closes, errors, or idles out. A transport failure tears the
/// connection down exactly like a voluntary close and never touches chat
/// status.
async fn handle_socket(socket: WebSocket, state: AppState, claims: UserClaims) {
    let idle_timeout = Duration::from_secs(state.config.chat.idle_timeout_secs);
    let conn_id = ConnectionId::new();

    let (mut ws_tx, mut ws_rx) = socket.split();

    // All outbound traffic (fan-out and error frames) goes through one
    // queue per connection; the writer task owns the sink.
    let (tx, mut rx) = mpsc::channel::<String>(state.config.chat.send_queue);
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(WsMessage::Close(None)).await;
    });

    let mut bound: Option<i64> = None;

    loop {
        let msg = match tokio::time::timeout(idle_timeout, ws_rx.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                tracing::warn!(connection_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
            Ok(None) => break,
            Err(_) => {
                // Idle period exceeded; reclaim the connection.
                tracing::info!(connection_id = %conn_id, "Closing idle connection");
                send_error_frame(&tx, "idle_timeout", "Connection closed due to inactivity");
                break;
            }
        };

        let text = match msg {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            // axum answers pings automatically
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            WsMessage::Binary(_) => {
                send_error_frame(&tx, "bad_value", "Binary frames are not supported");
                continue;
            }
        };

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(connection_id = %conn_id, "Unparseable frame: {}", e);
                send_error_frame(&tx, "bad_value", "Malformed frame");
                continue;
            }
        };

        match bound {
            None => {
                // First frame: bind the connection to its chat.
                match state
                    .services
                    .chats
                    .chat_for_subscription(frame.chat_id, &claims)
                    .await
                {
                    Ok(chat) => {
                        state
                            .services
                            .registry
                            .subscribe(chat.id, conn_id, tx.clone())
                            .await;
                        bound = Some(chat.id);
                        tracing::info!(
                            chat_id = chat.id,
                            connection_id = %conn_id,
                            role = %claims.role,
                            "Connection bound"
                        );

                        if !frame.is_bind_only() {
                            if let Err(e) = state
                                .services
                                .registry
                                .publish(chat.id, conn_id, &claims, &frame.content)
                                .await
                            {
                                send_error_frame(&tx, e.code(), &ErrorResponse::from(&e).message);
                            }
                        }
                    }
                    Err(e) => {
                        send_error_frame(&tx, e.code(), &ErrorResponse::from(&e).message);
                        break;
                    }
                }
            }
            Some(chat_id) => {
                // Later frames are assumed bound to the declared chat;
                // empty content is a keepalive.
                if frame.is_bind_only() {
                    continue;
                }
                if let Err(e) = state
                    .services
                    .registry
                    .publish(chat_id, conn_id, &claims, &frame.content)
                    .await
                {
                    send_error_frame(&tx, e.code(), &ErrorResponse::from(&e).message);
                }
            }
        }
    }

    if let Some(chat_id) = bound {
        state.services.registry.unsubscribe(chat_id, conn_id).await;
    }
    drop(tx);
    let _ = writer.await;

    tracing::debug!(connection_id = %conn_id, "Connection closed");
}

fn send_error_frame(tx: &mpsc::Sender<String>, error: &str, message: &str) {
    let body = ErrorResponse {
        error: error.to_string(),
        message: message.to_string(),
    };
    if let Ok(json) = serde_json::to_string(&body) {
        let _ = tx.try_send(json);
    }
}
