//! Unified error type for Tether.

use tether_protocol::ProtocolError;
use tether_reconnect::ResolveError;
use tether_transport::TransportError;

/// Misuse of a [`DurableSocket`](crate::DurableSocket) handle.
///
/// Connectivity problems are never reported here: while the socket is alive,
/// `send` queues instead of failing.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// The socket was closed explicitly (or every handle was dropped).
    #[error("socket is closed")]
    Closed,

    /// A typed payload could not be turned into JSON.
    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// Opening, reading or writing the underlying channel failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A plugin rejected a payload.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The URL resolver failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Socket(#[from] SocketError),
}
