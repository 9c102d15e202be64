//! The listener registry and RAII subscriptions.
//!
//! Listeners belong to the socket, not to a channel, so they survive every
//! reconnect. Dispatch happens on the socket's task: callbacks must be quick
//! and must not block.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::{EventKind, SocketEvent};

/// A registered callback.
pub type Listener = Arc<dyn Fn(&SocketEvent) + Send + Sync>;

/// Identifies one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Callbacks keyed by registration order.
///
/// Callbacks run outside the registry's lock, so a callback may add or
/// remove listeners (including itself). A listener removed while an event
/// is being dispatched is not called for that event.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<ListenerId, (EventKind, Listener)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<ListenerId, (EventKind, Listener)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `listener` for events of `kind`.
    pub fn add(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().insert(id, (kind, listener));
        id
    }

    /// Removes a registration. Returns `false` if it was already gone.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.entries().remove(&id).is_some()
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.entries().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Calls every listener registered for the event's kind, oldest first.
    pub(crate) fn dispatch(&self, event: &SocketEvent) {
        let kind = event.kind();
        let matching: Vec<(ListenerId, Listener)> = self
            .entries()
            .iter()
            .filter(|(_, (k, _))| *k == kind)
            .map(|(id, (_, listener))| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in matching {
            if self.contains(id) {
                listener(event);
            }
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Removes its listener when dropped.
///
/// Holds only a weak reference, so an outstanding subscription never keeps
/// a socket's registry alive.
#[must_use = "dropping a Subscription removes the listener immediately"]
#[derive(Debug)]
pub struct Subscription {
    id: ListenerId,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Removes the listener now.
    pub fn unsubscribe(self) {}

    /// Keeps the listener registered for the registry's whole lifetime.
    pub fn detach(mut self) -> ListenerId {
        self.registry = Weak::new();
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

/// A source of [`SocketEvent`]s with scoped subscriptions.
pub trait Subscribable {
    /// Registers `listener` for `kind`; the returned guard removes it.
    fn subscribe_listener(&self, kind: EventKind, listener: Listener) -> Subscription;

    /// Removes a registration by id. Returns `false` if it was already gone.
    fn unsubscribe(&self, id: ListenerId) -> bool;

    /// Closure form of [`subscribe_listener`](Self::subscribe_listener).
    fn subscribe<F>(&self, kind: EventKind, listener: F) -> Subscription
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe_listener(kind, Arc::new(listener))
    }
}

impl Subscribable for Arc<ListenerRegistry> {
    fn subscribe_listener(&self, kind: EventKind, listener: Listener) -> Subscription {
        Subscription {
            id: self.add(kind, listener),
            registry: Arc::downgrade(self),
        }
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tether_protocol::Payload;

    use super::*;
    use crate::CloseInfo;

    fn counter() -> (Arc<AtomicUsize>, Listener) {
        let count = Arc::new(AtomicUsize::new(0));
        let listener: Listener = {
            let count = Arc::clone(&count);
            Arc::new(move |_: &SocketEvent| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, listener)
    }

    #[test]
    fn test_dispatch_filters_by_kind() {
        let registry = ListenerRegistry::new();
        let (opens, on_open) = counter();
        let (closes, on_close) = counter();
        registry.add(EventKind::Open, on_open);
        registry.add(EventKind::Close, on_close);

        registry.dispatch(&SocketEvent::Open);
        registry.dispatch(&SocketEvent::Open);
        registry.dispatch(&SocketEvent::Close(CloseInfo::normal("")));

        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = ListenerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..4 {
            let order = Arc::clone(&order);
            registry.add(
                EventKind::Message,
                Arc::new(move |_: &SocketEvent| order.lock().unwrap().push(n)),
            );
        }

        registry.dispatch(&SocketEvent::Message(Payload::from("x")));
        assert_eq!(*order.lock().unwrap(), [0, 1, 2, 3]);
    }

    #[test]
    fn test_remove_stops_delivery() {
        let registry = ListenerRegistry::new();
        let (count, listener) = counter();
        let id = registry.add(EventKind::Open, listener);

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        registry.dispatch(&SocketEvent::Open);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_removed_mid_dispatch_is_skipped() {
        let registry = Arc::new(ListenerRegistry::new());
        let (count, second) = counter();
        let second_id = Arc::new(Mutex::new(None::<ListenerId>));

        {
            let registry_ref = Arc::downgrade(&registry);
            let second_id = Arc::clone(&second_id);
            registry.add(
                EventKind::Open,
                Arc::new(move |_: &SocketEvent| {
                    let id = second_id.lock().unwrap().take();
                    if let (Some(registry), Some(id)) = (registry_ref.upgrade(), id) {
                        registry.remove(id);
                    }
                }),
            );
        }
        *second_id.lock().unwrap() = Some(registry.add(EventKind::Open, second));

        registry.dispatch(&SocketEvent::Open);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_subscription_drop_unsubscribes() {
        let registry = Arc::new(ListenerRegistry::new());
        let (count, _) = counter();

        let subscription = {
            let count = Arc::clone(&count);
            registry.subscribe(EventKind::Open, move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        registry.dispatch(&SocketEvent::Open);
        drop(subscription);
        registry.dispatch(&SocketEvent::Open);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_detach_keeps_listener() {
        let registry = Arc::new(ListenerRegistry::new());
        let (count, listener) = counter();

        let id = registry.subscribe_listener(EventKind::Open, listener).detach();
        registry.dispatch(&SocketEvent::Open);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.unsubscribe(id));
    }

    #[test]
    fn test_subscription_outliving_registry_is_harmless() {
        let registry = Arc::new(ListenerRegistry::new());
        let subscription = registry.subscribe(EventKind::Open, |_| {});
        drop(registry);
        subscription.unsubscribe();
    }
}
