//! In-process channels backed by tokio mpsc queues.
//!
//! [`memory_endpoint`] returns a connector/listener pair. Every successful
//! `connect` produces two linked [`MemoryChannel`]s: the caller keeps one and
//! the listener yields the other. Closing or dropping either side makes the
//! other side's `recv` return `Ok(None)`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::mpsc;

use crate::{Channel, Connector, Frame, TransportError};

struct Shared {
    reachable: AtomicBool,
    connections: AtomicUsize,
    accept_tx: mpsc::UnboundedSender<MemoryChannel>,
}

/// Creates a linked in-memory connector and listener.
pub fn memory_endpoint() -> (MemoryConnector, MemoryListener) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        reachable: AtomicBool::new(true),
        connections: AtomicUsize::new(0),
        accept_tx,
    });
    (
        MemoryConnector {
            shared: Arc::clone(&shared),
        },
        MemoryListener { shared, accept_rx },
    )
}

/// The client half of an in-memory endpoint.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl Connector for MemoryConnector {
    type Channel = MemoryChannel;

    async fn connect(&self, url: &str) -> Result<Self::Channel, TransportError> {
        if !self.shared.reachable.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed {
                url: url.to_owned(),
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "endpoint unreachable",
                ),
            });
        }

        let (client, server) = MemoryChannel::pair();
        self.shared
            .accept_tx
            .send(server)
            .map_err(|_| TransportError::Shutdown)?;
        self.shared.connections.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(url, "in-memory channel opened");
        Ok(client)
    }
}

/// The server half of an in-memory endpoint.
pub struct MemoryListener {
    shared: Arc<Shared>,
    accept_rx: mpsc::UnboundedReceiver<MemoryChannel>,
}

impl MemoryListener {
    /// Waits for the next connection.
    pub async fn accept(&mut self) -> Option<MemoryChannel> {
        self.accept_rx.recv().await
    }

    /// Returns an already-established connection without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryChannel> {
        self.accept_rx.try_recv().ok()
    }

    /// Returns a handle that can steer the endpoint while this listener is
    /// owned by a server task.
    pub fn control(&self) -> MemoryControl {
        MemoryControl {
            shared: Arc::clone(&self.shared),
        }
    }

    /// See [`MemoryControl::set_reachable`].
    pub fn set_reachable(&self, reachable: bool) {
        self.control().set_reachable(reachable);
    }

    /// See [`MemoryControl::connection_count`].
    pub fn connection_count(&self) -> usize {
        self.control().connection_count()
    }
}

/// Steers an in-memory endpoint from outside the task that accepts on it.
#[derive(Clone)]
pub struct MemoryControl {
    shared: Arc<Shared>,
}

impl MemoryControl {
    /// Makes future `connect` calls succeed (`true`) or be refused (`false`).
    /// Existing channels are unaffected.
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Total number of channels successfully opened against this endpoint.
    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }
}

/// One end of an in-memory duplex channel.
pub struct MemoryChannel {
    tx: Option<mpsc::UnboundedSender<Frame>>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryChannel {
    /// Creates two channel ends wired to each other.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(a_tx),
                rx: b_rx,
            },
            Self {
                tx: Some(b_tx),
                rx: a_rx,
            },
        )
    }

    /// Returns the next frame if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

impl Channel for MemoryChannel {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or_else(|| {
            TransportError::ConnectionClosed("closed locally".into())
        })?;
        tx.send(frame)
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        if self.tx.is_none() {
            return Ok(None);
        }
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}
