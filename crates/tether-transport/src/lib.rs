//! Underlying channel abstraction for Tether.
//!
//! Provides the [`Connector`] and [`Channel`] traits that abstract over the
//! physical duplex connection a durable socket wraps. A connector opens one
//! channel per connection attempt; the channel carries text and binary
//! [`Frame`]s until either side closes it.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket client and listener via `tokio-tungstenite`
//!
//! The in-memory endpoint ([`memory_endpoint`]) is always available. It is
//! what the timing-sensitive tests run against, because it involves no real
//! I/O and therefore behaves deterministically under a paused tokio clock.

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{memory_endpoint, MemoryChannel, MemoryConnector, MemoryControl, MemoryListener};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketChannel, WebSocketConnector, WebSocketListener};

use std::fmt;
use std::future::Future;

/// One message as it travels over the underlying channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A UTF-8 text frame.
    Text(String),
    /// A binary frame.
    Binary(Vec<u8>),
}

impl Frame {
    /// Returns the frame's text, if it is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Frame::Text(text) => Some(text),
            Frame::Binary(_) => None,
        }
    }

    /// Length of the frame body in bytes.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the frame body is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Frame::Text(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Frame::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Frame::Binary(bytes)
    }
}

/// Identifies one underlying channel's lifetime.
///
/// Every time a durable socket starts a new connection attempt it moves to
/// the next generation. Asynchronous work (timers, resolver results, plugin
/// commands) carries the generation it was started under, so anything that
/// belongs to a superseded channel can be recognised and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    /// Creates a `Generation` from a raw `u64`.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the generation that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Opens new outgoing channels.
pub trait Connector: Send + Sync + 'static {
    /// The channel type produced by this connector.
    type Channel: Channel;

    /// Opens a channel to `url`, completing once the handshake is done and
    /// the channel is ready to carry frames.
    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Channel, TransportError>> + Send;
}

/// A single duplex connection that carries [`Frame`]s.
pub trait Channel: Send + 'static {
    /// Sends a frame to the remote peer.
    fn send(
        &mut self,
        frame: Frame,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    ///
    /// Must be cancel-safe: it is raced inside `tokio::select!`, and dropping
    /// the future before it completes must not lose a frame.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Frame>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
