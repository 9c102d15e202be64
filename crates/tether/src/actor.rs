//! The socket actor: one Tokio task per durable socket.
//!
//! The actor owns everything that changes: the current channel, the
//! outbound queue, the plugin chain and the reconnect controller. Handles
//! reach it only through the command channel, so socket state never needs
//! a lock.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tether_protocol::{Inbound, LinkCommand, Payload, PluginChain, PluginLink};
use tether_reconnect::{Decision, ReconnectController, ReconnectPolicy, ResolveError};
use tether_transport::{Channel, Connector, Frame, Generation, TransportError};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use crate::listeners::ListenerRegistry;
use crate::queue::OutboundQueue;
use crate::{CloseInfo, ReadyState, SocketConfig, SocketEvent, TetherError};

/// An in-flight connection attempt.
type BoxConnect<C> = Pin<Box<dyn Future<Output = (Generation, Result<C, TetherError>)> + Send>>;

/// A pending URL resolution.
type BoxResolve = Pin<Box<dyn Future<Output = Result<String, ResolveError>> + Send>>;

/// Commands sent to the socket actor by its handles.
pub(crate) enum SocketCommand {
    /// Encode and write (or queue) a payload.
    Send(Payload),
    /// Drop the current channel, if any, and connect again now.
    Reconnect,
    /// Shut down for good.
    Close(CloseInfo),
}

pub(crate) struct SocketActor<K: Connector> {
    connector: Arc<K>,
    url: String,
    controller: ReconnectController,
    plugins: PluginChain,
    plugins_open: bool,
    queue: OutboundQueue,
    listeners: Arc<ListenerRegistry>,
    ready: watch::Sender<ReadyState>,
    channel: Option<(Generation, K::Channel)>,
    connecting: Option<BoxConnect<K::Channel>>,
    retry_at: Option<(Generation, Instant)>,
    commands: mpsc::UnboundedReceiver<SocketCommand>,
    link_tx: mpsc::UnboundedSender<LinkCommand>,
    link_rx: mpsc::UnboundedReceiver<LinkCommand>,
}

impl<K: Connector> SocketActor<K> {
    pub(crate) fn new(
        connector: K,
        url: String,
        config: SocketConfig,
        plugins: PluginChain,
        listeners: Arc<ListenerRegistry>,
        ready: watch::Sender<ReadyState>,
        commands: mpsc::UnboundedReceiver<SocketCommand>,
    ) -> Self {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        Self {
            connector: Arc::new(connector),
            url,
            controller: ReconnectController::new(config.reconnect),
            plugins,
            plugins_open: false,
            queue: OutboundQueue::new(config.queue),
            listeners,
            ready,
            channel: None,
            connecting: None,
            retry_at: None,
            commands,
            link_tx,
            link_rx,
        }
    }

    /// Runs the actor loop until the socket is closed or every handle is
    /// dropped.
    pub(crate) async fn run(mut self) {
        info!(url = %self.url, plugins = ?self.plugins, "durable socket started");

        if let Some(generation) = self.controller.connect_now() {
            self.start_attempt(generation);
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SocketCommand::Send(payload)) => self.handle_send(payload).await,
                    Some(SocketCommand::Reconnect) => self.handle_reconnect().await,
                    Some(SocketCommand::Close(info)) => {
                        self.shutdown(info).await;
                        break;
                    }
                    None => {
                        debug!(url = %self.url, "all handles dropped");
                        self.shutdown(CloseInfo::normal("socket dropped")).await;
                        break;
                    }
                },
                Some(command) = self.link_rx.recv() => self.handle_link(command).await,
                (generation, result) = next_connection(&mut self.connecting) => {
                    self.handle_connected(generation, result).await;
                }
                generation = retry_due(self.retry_at) => self.handle_retry(generation),
                (generation, result) = next_frame(&mut self.channel) => {
                    self.handle_frame(generation, result).await;
                }
            }
        }

        debug!(url = %self.url, "socket actor stopped");
    }

    // -- connecting ---------------------------------------------------------

    fn start_attempt(&mut self, generation: Generation) {
        let connector = Arc::clone(&self.connector);
        let target = self.controller.policy().resolve(&self.url);
        self.ready.send_replace(ReadyState::Connecting);
        let attempt: BoxConnect<K::Channel> = Box::pin(async move {
            let result = open_channel(connector, target, generation).await;
            (generation, result)
        });
        self.connecting = Some(attempt);
    }

    fn handle_retry(&mut self, generation: Generation) {
        self.retry_at = None;
        if self.controller.begin_attempt(generation) {
            self.start_attempt(generation);
        }
    }

    async fn handle_connected(
        &mut self,
        generation: Generation,
        result: Result<K::Channel, TetherError>,
    ) {
        if !self.controller.is_current(generation) {
            trace!(generation = %generation, "discarding superseded connection attempt");
            if let Ok(mut channel) = result {
                let _ = channel.close().await;
            }
            return;
        }

        match result {
            Ok(channel) => self.handle_open(generation, channel).await,
            Err(err) => {
                debug!(generation = %generation, error = %err, "connection attempt failed");
                let reason = err.to_string();
                self.listeners.dispatch(&SocketEvent::Error(reason.clone()));
                self.handle_loss(generation, CloseInfo::abnormal(reason)).await;
            }
        }
    }

    async fn handle_open(&mut self, generation: Generation, mut channel: K::Channel) {
        if !self.controller.on_open(generation) {
            let _ = channel.close().await;
            return;
        }

        self.channel = Some((generation, channel));
        self.ready.send_replace(ReadyState::Open);
        info!(generation = %generation, queued = self.queue.len(), "socket open");

        if !self.flush(generation).await {
            return;
        }

        self.plugins.open(&PluginLink::new(generation, self.link_tx.clone()));
        self.plugins_open = true;
        self.listeners.dispatch(&SocketEvent::Open);
    }

    async fn handle_reconnect(&mut self) {
        let Some(generation) = self.controller.connect_now() else {
            return;
        };
        info!(generation = %generation, "reconnect requested");
        self.retry_at = None;
        if self.release_channel().await {
            self.listeners
                .dispatch(&SocketEvent::Close(CloseInfo::normal("reconnect requested")));
        }
        self.start_attempt(generation);
    }

    // -- traffic ------------------------------------------------------------

    async fn handle_send(&mut self, payload: Payload) {
        let kind = payload.kind();
        let frame = match self.plugins.encode(payload) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(kind, error = %err, "dropping payload the plugin chain rejected");
                return;
            }
        };

        match self.channel.as_ref().map(|(generation, _)| *generation) {
            Some(generation) => {
                self.write(generation, frame, true).await;
            }
            None => self.queue.push(frame),
        }
    }

    /// Writes queued frames in order. Returns `false` if a write failed, in
    /// which case the loss has already been handled.
    async fn flush(&mut self, generation: Generation) -> bool {
        while let Some(frame) = self.queue.pop() {
            if !self.write(generation, frame, true).await {
                return false;
            }
        }
        true
    }

    /// Writes one frame to the open channel. On failure the frame goes back
    /// to the front of the queue (if `requeue`) and the channel is treated
    /// as lost.
    async fn write(&mut self, generation: Generation, frame: Frame, requeue: bool) -> bool {
        let result = match self.channel.as_mut() {
            Some((current, channel)) if *current == generation => channel.send(frame.clone()).await,
            _ => Err(TransportError::ConnectionClosed("no open channel".into())),
        };

        match result {
            Ok(()) => true,
            Err(err) => {
                debug!(generation = %generation, error = %err, "write failed");
                if requeue {
                    self.queue.requeue(frame);
                }
                let reason = err.to_string();
                self.listeners.dispatch(&SocketEvent::Error(reason.clone()));
                self.handle_loss(generation, CloseInfo::abnormal(reason)).await;
                false
            }
        }
    }

    async fn handle_frame(
        &mut self,
        generation: Generation,
        result: Result<Option<Frame>, TransportError>,
    ) {
        match result {
            Ok(Some(frame)) => match self.plugins.decode(frame) {
                Ok(Inbound::Deliver(payload)) => {
                    self.listeners.dispatch(&SocketEvent::Message(payload));
                }
                Ok(Inbound::Consumed) => {}
                Err(err) => {
                    warn!(generation = %generation, error = %err, "dropping undecodable frame");
                }
            },
            Ok(None) => {
                self.handle_loss(generation, CloseInfo::abnormal("connection closed by peer"))
                    .await;
            }
            Err(err) => {
                let reason = err.to_string();
                self.listeners.dispatch(&SocketEvent::Error(reason.clone()));
                self.handle_loss(generation, CloseInfo::abnormal(reason)).await;
            }
        }
    }

    async fn handle_link(&mut self, command: LinkCommand) {
        match command {
            LinkCommand::SendRaw { generation, frame } => {
                let live = matches!(&self.channel, Some((current, _)) if *current == generation);
                if live {
                    self.write(generation, frame, false).await;
                } else {
                    trace!(generation = %generation, "dropping raw frame for stale channel");
                }
            }
            LinkCommand::ForceReconnect { generation, reason } => {
                debug!(generation = %generation, reason = %reason, "plugin forced reconnect");
                self.handle_loss(generation, CloseInfo::abnormal(reason)).await;
            }
        }
    }

    // -- loss and shutdown --------------------------------------------------

    /// Handles any signal that the channel (or attempt) for `generation` is
    /// gone. Only the first signal per generation has an effect.
    async fn handle_loss(&mut self, generation: Generation, info: CloseInfo) {
        let decision = self.controller.on_loss(generation);
        if matches!(decision, Decision::Stale | Decision::Closed) {
            return;
        }

        self.release_channel().await;
        self.connecting = None;
        self.ready.send_replace(ReadyState::Closed);
        info!(
            generation = %generation,
            code = info.code,
            reason = %info.reason,
            "channel lost"
        );
        self.listeners.dispatch(&SocketEvent::Close(info));

        match decision {
            Decision::Retry {
                generation, delay, ..
            } => {
                let now = Instant::now();
                let at = now
                    .checked_add(delay)
                    .unwrap_or_else(|| now + ReconnectPolicy::MAX_DELAY);
                self.retry_at = Some((generation, at));
            }
            Decision::Exhausted => {
                self.retry_at = None;
                warn!(url = %self.url, queued = self.queue.len(), "giving up until reconnect() is called");
            }
            Decision::Stale | Decision::Closed => {}
        }
    }

    /// Tells plugins the channel is gone and closes it. Returns `true` if a
    /// channel was open.
    async fn release_channel(&mut self) -> bool {
        if self.plugins_open {
            self.plugins.close();
            self.plugins_open = false;
        }
        match self.channel.take() {
            Some((generation, mut channel)) => {
                if let Err(err) = channel.close().await {
                    trace!(generation = %generation, error = %err, "error closing channel");
                }
                true
            }
            None => false,
        }
    }

    async fn shutdown(&mut self, info: CloseInfo) {
        self.controller.close();
        self.retry_at = None;
        self.connecting = None;
        if self.channel.is_some() {
            self.ready.send_replace(ReadyState::Closing);
        }
        self.release_channel().await;

        if !self.queue.is_empty() {
            let discarded = self.queue.clear();
            warn!(url = %self.url, discarded, "closing with unsent payloads");
        }

        self.ready.send_replace(ReadyState::Closed);
        info!(url = %self.url, code = info.code, reason = %info.reason, "socket closed");
        self.listeners.dispatch(&SocketEvent::Close(info));
    }
}

async fn open_channel<K: Connector>(
    connector: Arc<K>,
    target: BoxResolve,
    generation: Generation,
) -> Result<K::Channel, TetherError> {
    let url = target.await?;
    debug!(generation = %generation, url = %url, "connecting");
    let channel = connector.connect(&url).await?;
    Ok(channel)
}

async fn next_connection<C>(connecting: &mut Option<BoxConnect<C>>) -> (Generation, Result<C, TetherError>) {
    let Some(attempt) = connecting.as_mut() else {
        return std::future::pending().await;
    };
    let output = attempt.await;
    *connecting = None;
    output
}

async fn retry_due(retry_at: Option<(Generation, Instant)>) -> Generation {
    match retry_at {
        Some((generation, at)) => {
            time::sleep_until(at).await;
            generation
        }
        None => std::future::pending().await,
    }
}

async fn next_frame<C: Channel>(
    channel: &mut Option<(Generation, C)>,
) -> (Generation, Result<Option<Frame>, TransportError>) {
    match channel {
        Some((generation, channel)) => (*generation, channel.recv().await),
        None => std::future::pending().await,
    }
}
