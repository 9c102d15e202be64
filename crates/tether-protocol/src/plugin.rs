//! The plugin interface and the ordered chain that runs it.
//!
//! A plugin is a unit of the send/receive pipeline. Every hook is optional:
//! the trait provides pass-through defaults, so a plugin only implements the
//! hooks it cares about.
//!
//! ## Chain order
//!
//! ```text
//!   caller ── send ──▶ [0] ──▶ [1] ──▶ … ──▶ [n-1] ──▶ channel
//!   caller ◀─ message ─ [0] ◀── [1] ◀── … ◀── [n-1] ◀── channel
//! ```
//!
//! Outbound payloads visit plugins in list order, inbound payloads in
//! reverse, so the last plugin in the list is the one nearest the raw
//! channel. Lifecycle hooks (`on_open`, `on_close`) run in list order.

use tether_transport::{Frame, Generation};
use tokio::sync::mpsc;

use crate::{Payload, ProtocolError};

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

/// Result of an inbound hook.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Hand the (possibly transformed) payload to the next plugin, or to
    /// the `message` listeners if this was the last one.
    Deliver(Payload),
    /// The plugin swallowed the payload; nobody further sees it.
    Consumed,
}

/// A composable unit of the send/receive pipeline.
///
/// Plugins hold private per-socket state and are owned by exactly one
/// socket. The same plugin instance serves every channel that socket opens,
/// so encoding must not depend on which channel is current.
pub trait Plugin: Send + 'static {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Outbound transform, called in chain order.
    fn on_send(&mut self, payload: Payload) -> Result<Payload, ProtocolError> {
        Ok(payload)
    }

    /// Inbound transform, called in reverse chain order.
    fn on_message(&mut self, payload: Payload) -> Result<Inbound, ProtocolError> {
        Ok(Inbound::Deliver(payload))
    }

    /// A new channel is open. `link` stays valid for that channel only.
    fn on_open(&mut self, link: &PluginLink) {
        let _ = link;
    }

    /// The channel the last `on_open` referred to is gone.
    fn on_close(&mut self) {}
}

// ---------------------------------------------------------------------------
// PluginLink
// ---------------------------------------------------------------------------

/// Requests a plugin can make of the socket that owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCommand {
    /// Write a frame straight to the channel, skipping every plugin.
    SendRaw { generation: Generation, frame: Frame },
    /// Treat the channel as dead and go through the reconnect path.
    ForceReconnect {
        generation: Generation,
        reason: String,
    },
}

/// A plugin's handle back to its socket, scoped to one channel.
///
/// Every command is stamped with the generation the link was issued for.
/// The socket drops commands whose generation is no longer current, so a
/// timer that outlives its channel cannot touch the next one.
#[derive(Debug, Clone)]
pub struct PluginLink {
    generation: Generation,
    tx: mpsc::UnboundedSender<LinkCommand>,
}

impl PluginLink {
    /// Creates a link for `generation` that delivers commands to `tx`.
    pub fn new(generation: Generation, tx: mpsc::UnboundedSender<LinkCommand>) -> Self {
        Self { generation, tx }
    }

    /// The channel generation this link belongs to.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Queues a raw frame for the channel. Returns `false` if the socket
    /// has shut down.
    pub fn send_raw(&self, frame: Frame) -> bool {
        self.tx
            .send(LinkCommand::SendRaw {
                generation: self.generation,
                frame,
            })
            .is_ok()
    }

    /// Asks the socket to drop the channel and reconnect. Returns `false`
    /// if the socket has shut down.
    pub fn force_reconnect(&self, reason: impl Into<String>) -> bool {
        self.tx
            .send(LinkCommand::ForceReconnect {
                generation: self.generation,
                reason: reason.into(),
            })
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// PluginChain
// ---------------------------------------------------------------------------

/// An ordered list of plugins, fixed at construction.
#[derive(Default)]
pub struct PluginChain {
    plugins: Vec<Box<dyn Plugin>>,
}

fn blame(plugin: &dyn Plugin, source: ProtocolError) -> ProtocolError {
    ProtocolError::Plugin {
        plugin: plugin.name(),
        source: Box::new(source),
    }
}

impl PluginChain {
    /// Creates a chain. Index 0 is nearest the caller.
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    /// Number of plugins in the chain.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the chain has no plugins.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugin names in chain order.
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Runs `on_send` forward and renders the result as a frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Plugin`] naming the first plugin that failed.
    pub fn encode(&mut self, payload: Payload) -> Result<Frame, ProtocolError> {
        let mut payload = payload;
        for plugin in self.plugins.iter_mut() {
            payload = plugin
                .on_send(payload)
                .map_err(|e| blame(&**plugin, e))?;
        }
        Ok(payload.into_frame())
    }

    /// Runs `on_message` in reverse, stopping at the first plugin that
    /// consumes the payload.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Plugin`] naming the first plugin that failed.
    pub fn decode(&mut self, frame: Frame) -> Result<Inbound, ProtocolError> {
        let mut payload = Payload::from(frame);
        for plugin in self.plugins.iter_mut().rev() {
            match plugin
                .on_message(payload)
                .map_err(|e| blame(&**plugin, e))?
            {
                Inbound::Deliver(next) => payload = next,
                Inbound::Consumed => {
                    tracing::trace!(plugin = plugin.name(), "inbound payload consumed");
                    return Ok(Inbound::Consumed);
                }
            }
        }
        Ok(Inbound::Deliver(payload))
    }

    /// Notifies every plugin, in order, that a channel opened.
    pub fn open(&mut self, link: &PluginLink) {
        for plugin in self.plugins.iter_mut() {
            plugin.on_open(link);
        }
    }

    /// Notifies every plugin, in order, that the channel closed.
    pub fn close(&mut self) {
        for plugin in self.plugins.iter_mut() {
            plugin.on_close();
        }
    }
}

impl std::fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl FromIterator<Box<dyn Plugin>> for PluginChain {
    fn from_iter<I: IntoIterator<Item = Box<dyn Plugin>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
