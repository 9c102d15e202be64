//! `DurableSocket` handle and builder.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tether_protocol::{Payload, Plugin, PluginChain};
use tether_reconnect::ReconnectPolicy;
use tether_transport::{Connector, WebSocketConnector};
use tokio::sync::{mpsc, watch};

use crate::actor::{SocketActor, SocketCommand};
use crate::listeners::{Listener, ListenerId, ListenerRegistry, Subscribable, Subscription};
use crate::{CloseInfo, EventKind, QueueConfig, ReadyState, SocketConfig, SocketError, SocketEvent};

/// Builder for configuring and starting a [`DurableSocket`].
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use tether::prelude::*;
///
/// # async fn demo() {
/// let socket = DurableSocket::builder("ws://127.0.0.1:9000")
///     .reconnect(ReconnectPolicy::exponential(
///         Duration::from_millis(250),
///         2.0,
///         Duration::from_secs(30),
///     ))
///     .plugin(json_plugin())
///     .plugin(heartbeat_plugin(Duration::from_secs(10), Duration::from_secs(5)))
///     .connect();
/// # }
/// ```
pub struct DurableSocketBuilder {
    url: String,
    config: SocketConfig,
    plugins: Vec<Box<dyn Plugin>>,
}

impl DurableSocketBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            config: SocketConfig::default(),
            plugins: Vec::new(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: SocketConfig) -> Self {
        self.config = config;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.config.queue = queue;
        self
    }

    /// Appends a plugin. Plugins added later sit nearer the channel.
    pub fn plugin(mut self, plugin: impl Plugin) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Appends several boxed plugins, in order.
    pub fn plugins(mut self, plugins: impl IntoIterator<Item = Box<dyn Plugin>>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    /// Starts the socket over WebSocket.
    ///
    /// # Panics
    /// If called outside a Tokio runtime.
    pub fn connect(self) -> DurableSocket {
        self.connect_with(WebSocketConnector)
    }

    /// Starts the socket over any [`Connector`].
    ///
    /// Returns immediately; the socket reports [`ReadyState::Connecting`]
    /// until the first channel opens.
    ///
    /// # Panics
    /// If called outside a Tokio runtime.
    pub fn connect_with<K: Connector>(self, connector: K) -> DurableSocket {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = watch::channel(ReadyState::Connecting);
        let listeners = Arc::new(ListenerRegistry::new());

        let actor = SocketActor::new(
            connector,
            self.url.clone(),
            self.config.validated(),
            PluginChain::new(self.plugins),
            Arc::clone(&listeners),
            ready_tx,
            cmd_rx,
        );
        tokio::spawn(actor.run());

        DurableSocket {
            shared: Arc::new(Shared {
                url: self.url,
                commands: cmd_tx,
                ready: ready_rx,
                listeners,
                closing: AtomicBool::new(false),
            }),
        }
    }
}

struct Shared {
    url: String,
    commands: mpsc::UnboundedSender<SocketCommand>,
    ready: watch::Receiver<ReadyState>,
    listeners: Arc<ListenerRegistry>,
    closing: AtomicBool,
}

/// A self-healing duplex message socket.
///
/// Cheap to clone; every clone drives the same socket. Dropping the last
/// clone closes the socket.
///
/// While the socket is alive, [`send`](Self::send) never fails: payloads
/// submitted with no channel open are queued and written, in order, as soon
/// as the next channel opens.
#[derive(Clone)]
pub struct DurableSocket {
    shared: Arc<Shared>,
}

impl DurableSocket {
    pub fn builder(url: impl Into<String>) -> DurableSocketBuilder {
        DurableSocketBuilder::new(url)
    }

    /// The URL given at construction. A URL resolver may direct individual
    /// attempts elsewhere.
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn ready_state(&self) -> ReadyState {
        let state = *self.shared.ready.borrow();
        if self.is_closing() && state != ReadyState::Closed {
            ReadyState::Closing
        } else {
            state
        }
    }

    fn is_closing(&self) -> bool {
        self.shared.closing.load(Ordering::SeqCst)
    }

    fn command(&self, command: SocketCommand) -> Result<(), SocketError> {
        if self.is_closing() {
            return Err(SocketError::Closed);
        }
        self.shared
            .commands
            .send(command)
            .map_err(|_| SocketError::Closed)
    }

    /// Sends a payload through the plugin chain.
    ///
    /// # Errors
    /// [`SocketError::Closed`] once [`close`](Self::close) has been called.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<(), SocketError> {
        self.command(SocketCommand::Send(payload.into()))
    }

    /// Serializes `value` into a structured payload and sends it.
    ///
    /// # Errors
    /// [`SocketError::Encode`] if `value` has no JSON form, otherwise as
    /// [`send`](Self::send).
    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<(), SocketError> {
        self.send(Payload::json(value)?)
    }

    /// Drops the current channel, if any, and connects again immediately
    /// with a fresh retry budget. Also revives a socket that ran out of
    /// retries.
    ///
    /// # Errors
    /// [`SocketError::Closed`] once [`close`](Self::close) has been called.
    pub fn reconnect(&self) -> Result<(), SocketError> {
        self.command(SocketCommand::Reconnect)
    }

    /// Closes the socket for good. Idempotent.
    pub fn close(&self) {
        self.close_with(CloseInfo::NORMAL, "");
    }

    /// Closes the socket for good, reporting `code` and `reason` to close
    /// listeners. Only the first call has an effect.
    pub fn close_with(&self, code: u16, reason: impl Into<String>) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        let info = CloseInfo {
            code,
            reason: reason.into(),
            was_clean: true,
        };
        let _ = self.shared.commands.send(SocketCommand::Close(info));
    }

    /// Waits until the socket reaches `state`.
    ///
    /// # Errors
    /// [`SocketError::Closed`] if the socket shuts down without ever
    /// reporting `state`.
    pub async fn wait_for_state(&self, state: ReadyState) -> Result<(), SocketError> {
        let mut ready = self.shared.ready.clone();
        ready
            .wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| SocketError::Closed)
    }

    /// Registers a callback. It stays registered across reconnects until
    /// removed.
    pub fn add_event_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.add(kind, Arc::new(listener))
    }

    /// Returns `false` if the listener was already removed.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }
}

impl Subscribable for DurableSocket {
    fn subscribe_listener(&self, kind: EventKind, listener: Listener) -> Subscription {
        self.shared.listeners.subscribe_listener(kind, listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.remove_event_listener(id)
    }
}

impl std::fmt::Debug for DurableSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableSocket")
            .field("url", &self.shared.url)
            .field("ready_state", &self.ready_state())
            .finish()
    }
}
