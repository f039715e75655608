//! The connection manager: one persistent socket, typed fan-out, bounded
//! fixed-delay reconnect.

use std::sync::{Arc, Mutex};

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use huddle_shared::{parse_frame, EventPayload, ServerEvent};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::connection::{ConnectionState, Connector, FrameSink, ReconnectConfig, TungsteniteConnector};
use super::lock;
use super::registry::{invoke_isolated, Handler, LifecycleCallback, Registry, Subscription};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Handle to the real-time connection. Cheap to clone; every clone drives the
/// same connection and registry.
///
/// None of the runtime operations fail: connection problems are logged and
/// fed into the reconnect path, and sends while not connected are dropped.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    reconnect: ReconnectConfig,
    connector: Arc<dyn Connector>,
    runtime: Handle,
    link: Mutex<Link>,
    registry: Arc<Mutex<Registry>>,
    lifecycle: Mutex<Lifecycle>,
}

/// Mutable connection bookkeeping.
struct Link {
    state: ConnectionState,
    /// Automatic attempts scheduled since the last successful open.
    attempts: u32,
    /// Bumped for every new attempt and on `disconnect()`; tasks holding an
    /// older value are stale and must not touch the link.
    generation: u64,
    outbound: Option<UnboundedSender<String>>,
    driver: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Lifecycle {
    on_connect: Vec<LifecycleCallback>,
    on_disconnect: Vec<LifecycleCallback>,
}

#[derive(Debug, Clone, Copy)]
enum LifecycleEvent {
    Connect,
    Disconnect,
}

impl ConnectionManager {
    /// Create a manager for `url`. Must be called inside a tokio runtime;
    /// the driver and reconnect tasks are spawned onto it.
    pub fn new(
        url: impl Into<String>,
        reconnect: ReconnectConfig,
        connector: impl Connector,
    ) -> ClientResult<Self> {
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        Ok(Self {
            inner: Arc::new(Inner {
                url: url.into(),
                reconnect,
                connector: Arc::new(connector),
                runtime,
                link: Mutex::new(Link {
                    state: ConnectionState::Closed,
                    attempts: 0,
                    generation: 0,
                    outbound: None,
                    driver: None,
                    reconnect_timer: None,
                }),
                registry: Arc::new(Mutex::new(Registry::default())),
                lifecycle: Mutex::new(Lifecycle::default()),
            }),
        })
    }

    /// Create a manager that talks real WebSockets to the configured endpoint.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        Self::new(config.ws_url.clone(), config.reconnect.clone(), TungsteniteConnector)
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Open the connection unless one is already open or being opened.
    ///
    /// An explicit call also restores the full automatic reconnect budget and
    /// supersedes any pending reconnect timer.
    pub fn connect(&self) {
        let mut link = lock(&self.inner.link);
        if link.state != ConnectionState::Closed {
            crate::log_debug!("connect() ignored: already {:?}", link.state);
            return;
        }
        if let Some(timer) = link.reconnect_timer.take() {
            timer.abort();
        }
        link.attempts = 0;
        self.inner.start(&mut link);
    }

    /// Tear everything down: close the connection, cancel any pending
    /// reconnect, and forget every handler and lifecycle callback.
    ///
    /// No `on_disconnect` callback fires for this close.
    pub fn disconnect(&self) {
        let (driver, timer, previous) = {
            let mut link = lock(&self.inner.link);
            link.generation += 1;
            let previous = link.state;
            link.state = ConnectionState::Closed;
            link.attempts = 0;
            // Dropping the sender lets the writer send a close frame and stop.
            link.outbound = None;
            (link.driver.take(), link.reconnect_timer.take(), previous)
        };

        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(driver) = driver {
            driver.abort();
        }

        lock(&self.inner.registry).clear();
        *lock(&self.inner.lifecycle) = Lifecycle::default();

        crate::log_info!(
            "Disconnected from {} (was {:?}); subscriptions cleared",
            self.inner.url,
            previous
        );
    }

    /// Serialize `payload` and write it if the connection is open.
    ///
    /// Otherwise the frame is dropped with a warning. Nothing is queued for
    /// a later connection.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) {
        let outbound = {
            let link = lock(&self.inner.link);
            match (&link.outbound, link.state) {
                (Some(tx), ConnectionState::Open) => tx.clone(),
                (_, state) => {
                    crate::log_warn!("Dropping outbound frame: connection is {:?}", state);
                    return;
                }
            }
        };

        let json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                crate::log_error!("Serialize failed: {}", e);
                return;
            }
        };

        crate::log_debug!("Sending to {}: {}", self.inner.url, json);
        if outbound.unbounded_send(json).is_err() {
            crate::log_warn!("Dropping outbound frame: connection closed while sending");
        }
    }

    /// Register `handler` for every inbound frame whose `type` is `event_type`.
    ///
    /// The returned guard unregisters on drop; see [`Subscription::detach`].
    pub fn on(&self, event_type: &str, handler: Handler) -> Subscription {
        let id = lock(&self.inner.registry).insert(event_type, handler);
        Subscription::new(&self.inner.registry, event_type, id)
    }

    /// Remove the first registration of exactly this `handler` for `event_type`.
    pub fn off(&self, event_type: &str, handler: &Handler) {
        if !lock(&self.inner.registry).remove_handler(event_type, handler) {
            crate::log_debug!("off(): handler not registered for `{}`", event_type);
        }
    }

    /// Register a typed handler for `P::EVENT_TYPE`.
    ///
    /// Frames whose `data` does not deserialize into `P` are logged and
    /// skipped for this handler only.
    pub fn subscribe<P, F>(&self, f: F) -> Subscription
    where
        P: EventPayload,
        F: Fn(P) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(move |frame: &Value| match P::from_frame(frame) {
            Ok(payload) => f(payload),
            Err(e) => crate::log_warn!("Skipping `{}` handler: {}", P::EVENT_TYPE, e),
        });
        self.on(P::EVENT_TYPE, handler)
    }

    /// Register one handler for every [`ServerEvent`] kind.
    pub fn subscribe_events<F>(&self, f: F) -> Vec<Subscription>
    where
        F: Fn(ServerEvent) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(move |frame: &Value| match ServerEvent::from_frame(frame) {
            Ok(event) => f(event),
            Err(e) => crate::log_warn!("Skipping event handler: {}", e),
        });
        ServerEvent::EVENT_TYPES
            .iter()
            .map(|event_type| self.on(event_type, handler.clone()))
            .collect()
    }

    /// Fire `callback` after every successful open.
    pub fn on_connect(&self, callback: impl Fn() + Send + Sync + 'static) {
        lock(&self.inner.lifecycle)
            .on_connect
            .push(Arc::new(callback));
    }

    /// Fire `callback` after every close, including failed connect attempts.
    pub fn on_disconnect(&self, callback: impl Fn() + Send + Sync + 'static) {
        lock(&self.inner.lifecycle)
            .on_disconnect
            .push(Arc::new(callback));
    }

    /// Whether the connection is open right now. Advisory only.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.link).state
    }

    /// Automatic reconnect attempts scheduled since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        lock(&self.inner.link).attempts
    }

    pub fn max_reconnect_attempts(&self) -> u32 {
        self.inner.reconnect.max_attempts
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let link = lock(&self.inner.link);
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.url)
            .field("state", &link.state)
            .field("attempts", &link.attempts)
            .finish()
    }
}

impl Inner {
    /// CLOSED -> CONNECTING; spawns the driver for a fresh generation.
    fn start(self: &Arc<Self>, link: &mut Link) {
        link.generation += 1;
        let generation = link.generation;
        link.state = ConnectionState::Connecting;

        crate::log_info!("Connecting to {}", self.url);
        let inner = self.clone();
        link.driver = Some(self.runtime.spawn(inner.drive(generation)));
    }

    fn is_current(&self, generation: u64) -> bool {
        lock(&self.link).generation == generation
    }

    /// Owns one connection attempt from handshake to close.
    async fn drive(self: Arc<Self>, generation: u64) {
        let (sink, mut stream) = match self.connector.connect(&self.url).await {
            Ok(halves) => halves,
            Err(e) => {
                crate::log_warn!("WebSocket connect to {} failed: {}", self.url, e);
                self.handle_close(generation);
                return;
            }
        };

        let (tx, rx) = unbounded::<String>();
        {
            let mut link = lock(&self.link);
            if link.generation != generation {
                return;
            }
            link.state = ConnectionState::Open;
            link.attempts = 0;
            link.outbound = Some(tx);
        }
        crate::log_info!("WebSocket connected to {}", self.url);
        self.fire(LifecycleEvent::Connect);

        let mut writer = self.runtime.spawn(write_frames(rx, sink));

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(text)) => {
                        self.dispatch(&text);
                    }
                    Some(Err(e)) => {
                        crate::log_warn!("WebSocket read error on {}: {}", self.url, e);
                        break;
                    }
                    None => {
                        crate::log_info!("WebSocket to {} closed by peer", self.url);
                        break;
                    }
                },
                _ = &mut writer => {
                    crate::log_warn!("WebSocket writer for {} stopped", self.url);
                    break;
                }
            }

            // A handler may have called disconnect().
            if !self.is_current(generation) {
                return;
            }
        }

        self.handle_close(generation);
    }

    /// Parse one frame and fan it out.
    fn dispatch(&self, text: &str) {
        let frame = match parse_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                crate::log_warn!("Discarding inbound frame: {}", e);
                return;
            }
        };

        let handlers = lock(&self.registry).handlers_for(&frame.event_type);
        if handlers.is_empty() {
            crate::log_debug!("No handlers for `{}`", frame.event_type);
            return;
        }

        let what = format!("handler for `{}`", frame.event_type);
        for handler in &handlers {
            invoke_isolated(&what, || handler(&frame.value));
        }
    }

    /// CONNECTING/OPEN -> CLOSED, then the reconnect decision.
    fn handle_close(self: &Arc<Self>, generation: u64) {
        {
            let mut link = lock(&self.link);
            if link.generation != generation {
                return;
            }
            link.state = ConnectionState::Closed;
            link.outbound = None;
            link.driver = None;
        }

        self.fire(LifecycleEvent::Disconnect);

        let mut link = lock(&self.link);
        // A disconnect callback may have reconnected or torn down.
        if link.generation != generation || link.state != ConnectionState::Closed {
            return;
        }
        if !self.reconnect.allows(link.attempts) {
            crate::log_warn!(
                "Giving up on {} after {} reconnect attempts",
                self.url,
                link.attempts
            );
            return;
        }

        link.attempts += 1;
        let delay = self.reconnect.delay;
        crate::log_info!(
            "Reconnecting to {} in {}ms (attempt {}/{})",
            self.url,
            delay.as_millis(),
            link.attempts,
            self.reconnect.max_attempts
        );

        let inner = self.clone();
        link.reconnect_timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let mut link = lock(&inner.link);
            if link.generation != generation || link.state != ConnectionState::Closed {
                return;
            }
            link.reconnect_timer = None;
            inner.start(&mut link);
        }));
    }

    fn fire(&self, event: LifecycleEvent) {
        let callbacks = {
            let lifecycle = lock(&self.lifecycle);
            match event {
                LifecycleEvent::Connect => lifecycle.on_connect.clone(),
                LifecycleEvent::Disconnect => lifecycle.on_disconnect.clone(),
            }
        };
        let what = format!("{:?} callback", event);
        for callback in &callbacks {
            invoke_isolated(&what, || callback());
        }
    }
}

/// Forward queued frames to the transport until the sender side is dropped.
async fn write_frames(mut rx: UnboundedReceiver<String>, mut sink: FrameSink) {
    while let Some(text) = rx.next().await {
        if let Err(e) = sink.send(text).await {
            crate::log_error!("Send failed: {}", e);
            return;
        }
    }
    if let Err(e) = sink.close().await {
        crate::log_debug!("Close failed: {}", e);
    }
}
