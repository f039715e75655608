//! Connection state, reconnect policy and the transport seam.
//!
//! The manager never touches a socket directly; it asks a [`Connector`] for a
//! text-frame sink and stream. [`TungsteniteConnector`] is the production
//! implementation.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, Stream};

use crate::error::TransportError;

mod native;

pub use native::TungsteniteConnector;

/// Connection state of the manager's single transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }
}

/// Configuration for auto-reconnect behavior.
///
/// The delay is flat: every automatic attempt waits the same amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Automatic attempts allowed after consecutive unexpected closes
    pub max_attempts: u32,
    /// Wait before each automatic attempt
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(3000),
        }
    }
}

impl ReconnectConfig {
    /// Whether another automatic attempt fits in the budget after
    /// `attempts` have already been scheduled.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Outbound half of a transport: accepts serialized text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of a transport: yields text frames until the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Opens a text-frame transport to a URL.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError>;
}
