//! Real-time messaging over a single persistent WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 ConnectionManager                    │
//! │  connect / disconnect / send / on / off / lifecycle  │
//! └──────────────────────────────────────────────────────┘
//!        │ spawns                         ▲ dispatch by `type`
//!        ▼                                │
//!  ┌────────────┐   text frames   ┌──────────────┐
//!  │  driver    │ ──────────────▶ │   Registry   │ ─▶ handlers (in order)
//!  │  task      │                 └──────────────┘
//!  └────────────┘
//!        │ Connector (tokio-tungstenite in production)
//!        ▼
//!    ws://host/ws
//! ```
//!
//! One driver task owns each connection attempt and dispatches frames
//! sequentially, so handlers observe frames in arrival order. When the socket
//! drops unexpectedly the manager waits a fixed delay and retries, up to a
//! bounded number of attempts. Handlers survive reconnects; only
//! `disconnect()` clears them.
//!
//! # Usage
//!
//! ```rust,ignore
//! let manager = ConnectionManager::from_config(&ClientConfig::from_env()?)?;
//!
//! let _invites = manager.subscribe(|invite: GroupInvitation| {
//!     println!("invited to {}", invite.group_id);
//! });
//! manager.on_disconnect(|| println!("reconnecting..."));
//! manager.connect();
//!
//! manager.send(&ClientCommand::chat_message("u42", "hello"));
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

mod connection;
mod manager;
mod registry;

#[cfg(test)]
mod testing;

pub use connection::{
    ConnectionState, Connector, FrameSink, FrameStream, ReconnectConfig, TungsteniteConnector,
};
pub use manager::ConnectionManager;
pub use registry::{handler, Handler, HandlerId, LifecycleCallback, Subscription};

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Callbacks never run while one of these locks is held, so a poisoned lock
/// still guards consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
