//! Huddle real-time client
//!
//! The persistent connection behind chat, group join requests and
//! invitations: one WebSocket, many independent subscribers, bounded
//! automatic reconnection.

pub mod logging;

pub mod config;
pub mod error;
pub mod ws;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, TransportError};
pub use ws::{ConnectionManager, ConnectionState, ReconnectConfig, Subscription};
