//! Plugin event bus.
//!
//! Events are emitted by the plugin manager and dispatcher and consumed by
//! the host pipeline and diagnostic tooling. The bus is an explicitly
//! constructed object injected into its collaborators; there is no global
//! instance.

pub mod plugin;

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

pub use plugin::{
    ConfigEvent, EventKind, HookErrorEvent, HookEvent, LifecycleEvent, PerformanceEvent,
    PluginEvent,
};

/// Handle for removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked for each matching event.
pub type EventCallback = Box<dyn Fn(&PluginEvent) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    callback: EventCallback,
}

/// Synchronous publish/subscribe bus for [`PluginEvent`]s.
///
/// Callbacks run inline on the emitting thread; subscribers must not block.
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<EventKind, Vec<Subscriber>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish()
    }
}

impl EventBus {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribes to events of the given kind.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&PluginEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscribers = self.subscribers.write().expect("event bus lock poisoned");
        subscribers.entry(kind).or_default().push(Subscriber {
            id,
            callback: Box::new(callback),
        });
        id
    }

    /// Removes a subscription. Returns whether it existed.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().expect("event bus lock poisoned");
        let mut removed = false;
        for entries in subscribers.values_mut() {
            let before = entries.len();
            entries.retain(|s| s.id != id);
            removed |= entries.len() != before;
        }
        subscribers.retain(|_, entries| !entries.is_empty());
        removed
    }

    /// Delivers an event to every subscriber of its kind.
    pub fn emit(&self, event: &PluginEvent) {
        let subscribers = self.subscribers.read().expect("event bus lock poisoned");
        if let Some(entries) = subscribers.get(&event.kind()) {
            trace!(kind = ?event.kind(), subscribers = entries.len(), "Delivering event");
            for subscriber in entries {
                (subscriber.callback)(event);
            }
        }
    }

    /// Returns the number of subscribers for a kind.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let subscribers = self.subscribers.read().expect("event bus lock poisoned");
        subscribers.get(&kind).map(Vec::len).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_emit_reaches_subscriber() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        bus.on(EventKind::Registered, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&PluginEvent::Registered(LifecycleEvent::now("a", "1.0.0")));
        bus.emit(&PluginEvent::Unregistered(LifecycleEvent::now("a", "1.0.0")));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_subscription() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        let id = bus.on(EventKind::Enabled, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bus.off(id));
        assert!(!bus.off(id));

        bus.emit(&PluginEvent::Enabled(LifecycleEvent::now("a", "1.0.0")));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscriber_count() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(EventKind::HookError), 0);
        bus.on(EventKind::HookError, |_| {});
        bus.on(EventKind::HookError, |_| {});
        assert_eq!(bus.subscriber_count(EventKind::HookError), 2);
    }
}
