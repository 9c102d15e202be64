//! Event effects: `type`-routed message callbacks tied to a scope.
//!
//! An effect watches a socket's `message` events for structured payloads
//! whose `type` field equals a tag, and calls back with the whole object.
//! Every effect belongs to an [`EffectScope`]; disposing (or dropping) the
//! scope removes all of its listeners, after which none of its callbacks
//! fire again.
//!
//! ```rust,no_run
//! use tether::prelude::*;
//!
//! # async fn demo() {
//! let socket = create_durable_socket("ws://127.0.0.1:9000", ReconnectPolicy::default(), vec![
//!     Box::new(json_plugin()),
//! ]);
//! let scope = EffectScope::new();
//! create_websocket_event_effect(&scope, &socket, "user_update", |envelope| {
//!     println!("user changed: {}", envelope["data"]);
//! });
//! // ...
//! scope.dispose();
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tether_protocol::Payload;

use crate::listeners::{Subscribable, Subscription};
use crate::{EventKind, SocketEvent};

/// Owns subscriptions and removes them together.
#[derive(Debug, Default)]
pub struct EffectScope {
    subscriptions: Mutex<Vec<Subscription>>,
    disposed: AtomicBool,
}

impl EffectScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ties `subscription` to this scope. If the scope is already disposed
    /// the subscription is removed at once.
    pub fn adopt(&self, subscription: Subscription) {
        if self.is_disposed() {
            return;
        }
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscription);
    }

    /// Removes every subscription. Idempotent.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        let subscriptions = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        drop(subscriptions);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Calls `callback` with every structured message whose `type` is `type_tag`.
///
/// Text, binary, non-object values and objects without a matching string
/// `type` are ignored.
pub fn create_websocket_event_effect<S, F>(
    scope: &EffectScope,
    socket: &S,
    type_tag: impl Into<String>,
    callback: F,
) where
    S: Subscribable,
    F: Fn(&Value) + Send + Sync + 'static,
{
    let type_tag = type_tag.into();
    let subscription = socket.subscribe(EventKind::Message, move |event| {
        let SocketEvent::Message(Payload::Value(envelope)) = event else {
            return;
        };
        if envelope.get("type").and_then(Value::as_str) == Some(type_tag.as_str()) {
            callback(envelope);
        }
    });
    scope.adopt(subscription);
}

/// Registers one effect per `(type_tag, callback)` pair.
///
/// Messages for one tag reach its callback in arrival order; there is no
/// ordering between different tags.
pub fn create_websocket_event_effects<S, I, T, F>(scope: &EffectScope, socket: &S, handlers: I)
where
    S: Subscribable,
    I: IntoIterator<Item = (T, F)>,
    T: Into<String>,
    F: Fn(&Value) + Send + Sync + 'static,
{
    for (type_tag, callback) in handlers {
        create_websocket_event_effect(scope, socket, type_tag, callback);
    }
}
