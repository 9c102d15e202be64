//! Reconnect policy and backoff state machine for Tether.
//!
//! Decides whether and when a durable socket replaces its underlying channel
//! after a loss. The crate is deliberately I/O free: the
//! [`ReconnectController`] only answers questions ("a channel of generation
//! `g` just died, what now?") and the socket actor does the sleeping and the
//! connecting.
//!
//! # Duplicate-signal suppression
//!
//! One physical disruption usually produces several signals (a write error,
//! a read error, a close frame, a heartbeat timeout). The first signal for
//! the current [`Generation`] moves the controller to the next generation;
//! every later signal still carrying the old generation is reported as
//! [`Decision::Stale`] and ignored.
//!
//! # Integration
//!
//! ```ignore
//! match controller.on_loss(generation) {
//!     Decision::Retry { generation, delay, .. } => retry_at = Some((generation, now + delay)),
//!     Decision::Exhausted => { /* stay closed */ }
//!     Decision::Stale | Decision::Closed => {}
//! }
//! // later, when the timer fires:
//! if controller.begin_attempt(generation) { /* connect */ }
//! ```
//!
//! [`Generation`]: tether_transport::Generation

mod controller;
mod policy;

pub use controller::{ControllerState, Decision, ReconnectController};
pub use policy::{url_resolver, Delay, ReconnectPolicy, ResolveError, UrlResolver};
