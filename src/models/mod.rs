//! Data models for BiblioDesk

pub mod chat;
pub mod enums;
pub mod message;
pub mod user;

// Re-export commonly used types
pub use chat::{Chat, CreateChat};
pub use enums::{ChatStatus, Role};
pub use message::{ClientFrame, Message};
pub use user::UserClaims;
