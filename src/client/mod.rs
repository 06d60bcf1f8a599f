//! Client layer for front ends: REST wrapper, reconnecting WebSocket
//! client, and the role-parameterized session controller.

pub mod api;
pub mod controller;
pub mod socket;

pub use api::{ChatApi, ClaimOutcome};
pub use controller::ChatController;
pub use socket::{ChatSocket, ConnectionStatus, RetryPolicy, SocketEvent};
