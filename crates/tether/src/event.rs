//! Socket states and the events listeners receive.

use std::fmt;

use tether_protocol::Payload;

/// Connection state as seen by callers.
///
/// Discriminants match the WebSocket `readyState` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// Opening a channel, either for the first time or after a loss.
    Connecting = 0,
    /// A channel is open; sends go straight to it.
    Open = 1,
    /// `close()` was called and shutdown has not finished yet.
    Closing = 2,
    /// No channel. Either waiting out a reconnect delay, out of retries,
    /// or closed for good.
    Closed = 3,
}

impl ReadyState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_open(self) -> bool {
        self == ReadyState::Open
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadyState::Connecting => "CONNECTING",
            ReadyState::Open => "OPEN",
            ReadyState::Closing => "CLOSING",
            ReadyState::Closed => "CLOSED",
        })
    }
}

/// Which events a listener wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Close,
    Error,
    Message,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventKind::Open => "open",
            EventKind::Close => "close",
            EventKind::Error => "error",
            EventKind::Message => "message",
        })
    }
}

/// Why a channel went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// WebSocket close code.
    pub code: u16,
    pub reason: String,
    /// `true` only for closes the caller asked for.
    pub was_clean: bool,
}

impl CloseInfo {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// The channel dropped without a close handshake.
    pub const ABNORMAL: u16 = 1006;

    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: Self::NORMAL,
            reason: reason.into(),
            was_clean: true,
        }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: Self::ABNORMAL,
            reason: reason.into(),
            was_clean: false,
        }
    }
}

/// Something that happened on a durable socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A channel opened.
    Open,
    /// A decoded inbound payload.
    Message(Payload),
    /// A channel closed, or failed to open. The socket keeps reconnecting
    /// unless it was closed explicitly or ran out of retries.
    Close(CloseInfo),
    /// A connection attempt or an open channel failed.
    Error(String),
}

impl SocketEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SocketEvent::Open => EventKind::Open,
            SocketEvent::Message(_) => EventKind::Message,
            SocketEvent::Close(_) => EventKind::Close,
            SocketEvent::Error(_) => EventKind::Error,
        }
    }
}
