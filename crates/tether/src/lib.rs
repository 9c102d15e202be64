//! # Tether
//!
//! Self-healing duplex message sockets.
//!
//! A [`DurableSocket`] wraps one underlying channel at a time (a WebSocket
//! by default) and hides its loss from callers: payloads sent while no
//! channel is open are queued and delivered in order once the next one
//! opens, listeners survive every reconnect, and a reconnect policy decides
//! when to try again. Payloads pass through an ordered [`Plugin`] chain on
//! the way out and back through it in reverse on the way in.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tether::prelude::*;
//!
//! # async fn demo() -> Result<(), TetherError> {
//! let socket = create_durable_socket(
//!     "ws://127.0.0.1:9000",
//!     ReconnectPolicy::fixed(Duration::from_secs(1)),
//!     vec![
//!         Box::new(json_plugin()),
//!         Box::new(heartbeat_plugin(Duration::from_secs(5), Duration::from_secs(3))),
//!     ],
//! );
//!
//! socket.add_event_listener(EventKind::Message, |event| {
//!     if let SocketEvent::Message(payload) = event {
//!         println!("received {payload:?}");
//!     }
//! });
//!
//! // Queued until the first channel opens.
//! socket.send_json(&serde_json::json!({ "type": "hello" }))?;
//! socket.wait_for_state(ReadyState::Open).await?;
//! socket.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! | crate | role |
//! |---|---|
//! | `tether-transport` | channels, frames, WebSocket and in-memory endpoints |
//! | `tether-protocol` | payloads, the plugin chain, codec plugins |
//! | `tether-reconnect` | reconnect policy and state machine |
//! | `tether` | the socket, heartbeat, event effects |

mod actor;
mod config;
mod effects;
mod error;
mod event;
mod heartbeat;
mod listeners;
mod queue;
mod socket;

pub use config::{QueueConfig, SocketConfig};
pub use effects::{create_websocket_event_effect, create_websocket_event_effects, EffectScope};
pub use error::{SocketError, TetherError};
pub use event::{CloseInfo, EventKind, ReadyState, SocketEvent};
pub use heartbeat::{heartbeat_plugin, HeartbeatConfig, HeartbeatPlugin};
pub use listeners::{Listener, ListenerId, ListenerRegistry, Subscribable, Subscription};
pub use socket::{DurableSocket, DurableSocketBuilder};

pub use tether_protocol as protocol;
pub use tether_reconnect as reconnect;
pub use tether_transport as transport;

use tether_protocol::Plugin;
use tether_reconnect::ReconnectPolicy;

/// Starts a durable WebSocket to `url`.
///
/// Shorthand for [`DurableSocket::builder`] with a policy and a plugin list.
/// The socket reports [`ReadyState::Connecting`] as soon as this returns.
///
/// # Panics
/// If called outside a Tokio runtime.
pub fn create_durable_socket(
    url: impl Into<String>,
    policy: ReconnectPolicy,
    plugins: Vec<Box<dyn Plugin>>,
) -> DurableSocket {
    DurableSocket::builder(url)
        .reconnect(policy)
        .plugins(plugins)
        .connect()
}

/// Everything most callers need.
pub mod prelude {
    pub use crate::{
        create_durable_socket, create_websocket_event_effect, create_websocket_event_effects,
        heartbeat_plugin, CloseInfo, DurableSocket, DurableSocketBuilder, EffectScope, EventKind,
        HeartbeatConfig, QueueConfig, ReadyState, SocketConfig, SocketError, SocketEvent,
        Subscribable, Subscription, TetherError,
    };
    pub use tether_protocol::{json_plugin, schema_plugin, Envelope, Inbound, Payload, Plugin};
    pub use tether_reconnect::{url_resolver, Delay, ReconnectPolicy};
}
