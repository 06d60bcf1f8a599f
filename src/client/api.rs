//! REST client for the support-chat endpoints.
//!
//! Covers the request/response side: chat lists, creation, claiming,
//! closing, and history. Live delivery goes through
//! [`super::socket::ChatSocket`].

use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::ErrorResponse;
use crate::models::{chat::Chat, message::Message};

/// Outcome of a claim attempt. Losing the race to another librarian is an
/// expected outcome, not an error.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    Claimed(Chat),
    AlreadyAssigned,
}

/// HTTP client for the chat REST API.
#[derive(Clone)]
pub struct ChatApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ChatApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// The caller's own chats
    pub async fn my_chats(&self) -> Result<Vec<Chat>> {
        self.get_json("/chats").await
    }

    /// Create a new support chat
    pub async fn create_chat(&self, title: &str) -> Result<Chat> {
        let response = self
            .http
            .post(self.url("/chats"))
            .bearer_auth(&self.token)
            .json(&json!({ "title": title }))
            .send()
            .await
            .context("Failed to send create chat request")?;

        Self::expect_json(response).await
    }

    /// Chats assigned to the calling librarian
    pub async fn assigned_chats(&self) -> Result<Vec<Chat>> {
        self.get_json("/librarian/chats").await
    }

    /// The waiting queue
    pub async fn unassigned_chats(&self) -> Result<Vec<Chat>> {
        self.get_json("/librarian/chats/unassigned").await
    }

    /// Full message history for a chat
    pub async fn history(&self, chat_id: i64) -> Result<Vec<Message>> {
        self.get_json(&format!("/chats/{}/messages", chat_id)).await
    }

    /// Claim a waiting chat. A 409 means another librarian got there
    /// first; the caller reconciles its local view silently.
    pub async fn claim(&self, chat_id: i64) -> Result<ClaimOutcome> {
        let response = self
            .http
            .post(self.url(&format!("/librarian/chats/{}/assign", chat_id)))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Failed to send claim request")?;

        if response.status() == StatusCode::CONFLICT {
            return Ok(ClaimOutcome::AlreadyAssigned);
        }

        Ok(ClaimOutcome::Claimed(Self::expect_json(response).await?))
    }

    /// Close an active chat
    pub async fn close(&self, chat_id: i64) -> Result<Chat> {
        let response = self
            .http
            .post(self.url(&format!("/librarian/chats/{}/close", chat_id)))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Failed to send close request")?;

        Self::expect_json(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Request failed")?;

        Self::expect_json(response).await
    }

    async fn expect_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            if let Ok(body) = response.json::<ErrorResponse>().await {
                bail!("{} ({})", body.message, body.error);
            }
            bail!("Request failed with status {}", status);
        }

        response.json::<T>().await.context("Failed to parse response")
    }
}
