//! In-memory transport for exercising the manager without sockets.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{future, SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite;

use super::connection::{Connector, FrameSink, FrameStream};
use crate::error::TransportError;

/// What the next connect attempt does.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Outcome {
    Accept,
    Fail,
    /// Never completes, leaving the manager CONNECTING.
    Hang,
    /// Stays pending until [`MockControl::open_gate`], then accepts.
    Gated,
}

pub(crate) struct MockConnector {
    attempts: Arc<AtomicUsize>,
    script: Arc<Mutex<VecDeque<Outcome>>>,
    fallback: Outcome,
    gate: Arc<Notify>,
    accepted: UnboundedSender<ServerEnd>,
}

/// Test-side controls for a [`MockConnector`].
pub(crate) struct MockControl {
    attempts: Arc<AtomicUsize>,
    script: Arc<Mutex<VecDeque<Outcome>>>,
    gate: Arc<Notify>,
    accepted: UnboundedReceiver<ServerEnd>,
}

/// The server's side of one accepted connection. Dropping it closes the
/// connection from the server.
pub(crate) struct ServerEnd {
    to_client: UnboundedSender<Result<String, TransportError>>,
    from_client: UnboundedReceiver<String>,
}

impl MockConnector {
    /// `fallback` applies once any scripted outcomes are used up.
    pub(crate) fn new(fallback: Outcome) -> (Self, MockControl) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let script = Arc::new(Mutex::new(VecDeque::new()));
        let gate = Arc::new(Notify::new());
        let (accepted_tx, accepted_rx) = unbounded();
        (
            Self {
                attempts: attempts.clone(),
                script: script.clone(),
                fallback,
                gate: gate.clone(),
                accepted: accepted_tx,
            },
            MockControl {
                attempts,
                script,
                gate,
                accepted: accepted_rx,
            },
        )
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        match outcome {
            Outcome::Fail => Err(TransportError::WebSocket(tungstenite::Error::Io(
                std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            ))),
            Outcome::Hang => future::pending().await,
            Outcome::Gated => {
                self.gate.notified().await;
                Ok(self.accept())
            }
            Outcome::Accept => Ok(self.accept()),
        }
    }
}

impl MockConnector {
    fn accept(&self) -> (FrameSink, FrameStream) {
        let (to_client, client_rx) = unbounded();
        let (client_tx, from_client) = unbounded::<String>();
        let _ = self.accepted.unbounded_send(ServerEnd {
            to_client,
            from_client,
        });
        let sink = client_tx.sink_map_err(|_| TransportError::Closed);
        (Box::pin(sink), Box::pin(client_rx))
    }
}

impl MockControl {
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Queue outcomes for the next connect attempts.
    pub(crate) fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.script.lock().unwrap().extend(outcomes);
    }

    /// Let a pending [`Outcome::Gated`] attempt complete its handshake.
    pub(crate) fn open_gate(&self) {
        self.gate.notify_one();
    }

    pub(crate) async fn next_connection(&mut self) -> ServerEnd {
        self.accepted
            .next()
            .await
            .expect("connector dropped while waiting for a connection")
    }

    pub(crate) fn try_next_connection(&mut self) -> Option<ServerEnd> {
        self.accepted.try_recv().ok()
    }
}

impl ServerEnd {
    pub(crate) fn push(&self, text: &str) {
        let _ = self.to_client.unbounded_send(Ok(text.to_string()));
    }

    pub(crate) fn push_json(&self, value: Value) {
        self.push(&value.to_string());
    }

    /// Make the client's read half fail.
    pub(crate) fn fail(&self) {
        let _ = self.to_client.unbounded_send(Err(TransportError::Closed));
    }

    /// Next frame written by the client, or `None` once it closed its side.
    pub(crate) async fn next_sent(&mut self) -> Option<String> {
        self.from_client.next().await
    }

    pub(crate) fn try_sent(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }
}
