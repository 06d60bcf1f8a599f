//! BiblioDesk Library Support Chat
//!
//! The realtime support-chat service of the BiblioDesk library catalog:
//! patrons open chats, librarians claim and answer them, messages are
//! delivered live over WebSocket and persisted in PostgreSQL. The `client`
//! module provides the matching REST wrapper and reconnecting WebSocket
//! client for front ends.

use std::sync::Arc;

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
