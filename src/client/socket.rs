//! Reconnecting WebSocket client for a single chat subscription.
//!
//! A socket is bound to one chat for its whole lifetime: on every
//! (re)connect it sends the bind frame first, so a reconnect is a fresh
//! subscription rather than a resumed stream. Abnormal closes are retried
//! per [`RetryPolicy`]; a voluntary [`ChatSocket::close`] sends a normal
//! close frame and suppresses reconnection.

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::ErrorResponse;
use crate::models::message::{ClientFrame, Message};

/// Connection status for display in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected to server.
    Disconnected,
    /// Attempting to connect.
    Connecting,
    /// Connected and subscribed.
    Connected,
    /// Connection lost, will retry.
    Reconnecting { attempt: u32 },
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting..."),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting ({})", attempt),
        }
    }
}

/// Reconnect policy: exponential backoff with a cap, optionally bounded in
/// attempts. Cancellation (navigation away, voluntary close) is a single
/// token cancel rather than timer bookkeeping.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), or `None` once
    /// the policy is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt > max {
                return None;
            }
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}

/// Event surfaced to the session controller.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    Status(ConnectionStatus),
    /// A persisted message fanned out to this subscription.
    Message(Message),
    /// A send the server refused (e.g. `chat_closed`). Never silently
    /// dropped: the UI must not show the message as sent.
    Rejected { error: String, message: String },
}

/// WebSocket client bound to a single chat.
pub struct ChatSocket {
    chat_id: i64,
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<SocketEvent>,
    cancel: CancellationToken,
    #[allow(dead_code)]
    task: tokio::task::JoinHandle<()>,
}

impl ChatSocket {
    /// Open a subscription to `chat_id` and start the connection loop.
    pub fn connect(server_url: &str, token: &str, chat_id: i64, retry: RetryPolicy) -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel::<SocketEvent>();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(connection_loop(
            server_url.to_string(),
            token.to_string(),
            chat_id,
            retry,
            out_rx,
            ev_tx,
            cancel.clone(),
        ));

        Self {
            chat_id,
            tx: out_tx,
            rx: ev_rx,
            cancel,
            task,
        }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    /// Queue a message for sending.
    pub fn send(&self, content: impl Into<String>) -> Result<()> {
        self.tx
            .send(content.into())
            .context("Connection loop has stopped")
    }

    /// Receive the next socket event (async).
    pub async fn recv(&mut self) -> Option<SocketEvent> {
        self.rx.recv().await
    }

    /// Try to receive a socket event (non-blocking).
    pub fn try_recv(&mut self) -> Option<SocketEvent> {
        self.rx.try_recv().ok()
    }

    /// Voluntarily end the subscription. Sends a normal close frame and
    /// suppresses automatic reconnection.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ChatSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Connection loop: connect, bind, pump, and reconnect per policy.
async fn connection_loop(
    server_url: String,
    token: String,
    chat_id: i64,
    retry: RetryPolicy,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    ev_tx: mpsc::UnboundedSender<SocketEvent>,
    cancel: CancellationToken,
) {
    let mut attempt = 0u32;

    loop {
        let ws_url = match ws_url(&server_url, &token) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Invalid server URL: {}", e);
                let _ = ev_tx.send(SocketEvent::Status(ConnectionStatus::Disconnected));
                return;
            }
        };

        let _ = ev_tx.send(SocketEvent::Status(if attempt == 0 {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Reconnecting { attempt }
        }));

        let connected = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ev_tx.send(SocketEvent::Status(ConnectionStatus::Disconnected));
                return;
            }
            result = connect_async(ws_url.as_str()) => result,
        };

        match connected {
            Ok((mut ws_stream, _)) => {
                // Rebind immediately: the first frame subscribes this
                // transport to the chat without producing a message.
                let bind = match serde_json::to_string(&ClientFrame::bind(chat_id)) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!("Failed to encode bind frame: {}", e);
                        let _ = ev_tx.send(SocketEvent::Status(ConnectionStatus::Disconnected));
                        return;
                    }
                };

                if ws_stream.send(WsMessage::Text(bind.into())).await.is_ok() {
                    attempt = 0;
                    let _ = ev_tx.send(SocketEvent::Status(ConnectionStatus::Connected));

                    let reconnect =
                        handle_connection(ws_stream, chat_id, &mut out_rx, &ev_tx, &cancel).await;

                    if !reconnect {
                        // Voluntary close.
                        let _ = ev_tx.send(SocketEvent::Status(ConnectionStatus::Disconnected));
                        return;
                    }
                    tracing::warn!(chat_id, "Connection lost, will reconnect");
                }
            }
            Err(e) => {
                tracing::warn!(chat_id, "Connection failed: {}", e);
            }
        }

        attempt += 1;
        let Some(delay) = retry.delay_for(attempt) else {
            tracing::warn!(chat_id, "Retry policy exhausted after {} attempts", attempt - 1);
            let _ = ev_tx.send(SocketEvent::Status(ConnectionStatus::Disconnected));
            return;
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ev_tx.send(SocketEvent::Status(ConnectionStatus::Disconnected));
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Pump an established connection.
/// Returns true to reconnect, false for a voluntary shutdown.
async fn handle_connection(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    chat_id: i64,
    out_rx: &mut mpsc::UnboundedReceiver<String>,
    ev_tx: &mpsc::UnboundedSender<SocketEvent>,
    cancel: &CancellationToken,
) -> bool {
    let (mut ws_sink, mut ws_rx) = ws_stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Normal closure tells the server this subscription ended
                // on purpose.
                let _ = ws_sink.send(WsMessage::Close(None)).await;
                return false;
            }

            // Message from the controller to send to the server
            Some(content) = out_rx.recv() => {
                let frame = ClientFrame { chat_id, content };
                let json = match serde_json::to_string(&frame) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!("Failed to serialize frame: {}", e);
                        continue;
                    }
                };

                if ws_sink.send(WsMessage::Text(json.into())).await.is_err() {
                    return true; // Reconnect
                }
            }

            // Frame from the server
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Ok(message) = serde_json::from_str::<Message>(&text) {
                            if message.chat_id == chat_id {
                                let _ = ev_tx.send(SocketEvent::Message(message));
                            }
                        } else if let Ok(err) = serde_json::from_str::<ErrorResponse>(&text) {
                            let _ = ev_tx.send(SocketEvent::Rejected {
                                error: err.error,
                                message: err.message,
                            });
                        } else {
                            tracing::warn!("Unparseable server frame: {}", text);
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = ws_sink.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(_))) => {
                        tracing::info!(chat_id, "Server closed connection");
                        return true; // Reconnect
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        return true; // Reconnect
                    }
                    None => return true,
                }
            }
        }
    }
}

/// Convert the server base URL into the WebSocket endpoint, carrying the
/// session token as a query parameter (upgrade requests cannot set
/// headers from a browser).
fn ws_url(server_url: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(server_url).context("Invalid URL")?;

    let new_scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => anyhow::bail!("Unsupported URL scheme: {}", other),
    };

    url.set_scheme(new_scheme)
        .map_err(|_| anyhow::anyhow!("Failed to set scheme"))?;

    url.set_path("/ws");
    url.set_query(Some(&format!("token={}", token)));

    Ok(url)
}
