//! In-process fan-out of telemetry events to registered listeners.
//!
//! The broadcast starts disabled. While disabled, `publish` is a no-op and
//! listeners are never invoked. Listeners run synchronously on the
//! publisher's thread, in registration order, against a snapshot of the
//! registry taken before delivery starts. A listener that subscribes or
//! unsubscribes during delivery only affects later publishes.

use crate::model::TelemetryEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Callback invoked with each published event.
pub type TelemetryListener = Arc<dyn Fn(&TelemetryEvent) + Send + Sync>;

/// Handle returned by [`TelemetryBroadcast::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    index: usize,
    seq: u64,
}

struct Slot {
    seq: u64,
    listener: TelemetryListener,
}

#[derive(Default)]
struct Registry {
    slots: Vec<Option<Slot>>,
    next_seq: u64,
    live: usize,
}

/// Gate plus listener registry.
///
/// Trailing dead slots are dropped on unsubscribe, so an index may be
/// handed out again; the sequence number in [`SubscriptionId`] keeps a
/// stale id from removing the newer listener.
#[derive(Default)]
pub struct TelemetryBroadcast {
    enabled: AtomicBool,
    registry: RwLock<Registry>,
}

impl TelemetryBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Register a listener. Allowed whether or not the broadcast is enabled.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&TelemetryEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let seq = registry.next_seq;
        registry.next_seq += 1;
        registry.live += 1;
        registry.slots.push(Some(Slot {
            seq,
            listener: Arc::new(listener),
        }));
        SubscriptionId {
            index: registry.slots.len() - 1,
            seq,
        }
    }

    /// Remove a listener. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = registry.slots.get_mut(id.index) else {
            return false;
        };
        if !slot.as_ref().is_some_and(|s| s.seq == id.seq) {
            return false;
        }
        *slot = None;
        registry.live -= 1;

        while matches!(registry.slots.last(), Some(None)) {
            registry.slots.pop();
        }
        true
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .live
    }

    /// Deliver `event` to every live listener. Returns how many were invoked.
    pub fn publish(&self, event: &TelemetryEvent) -> usize {
        if !self.is_enabled() {
            return 0;
        }

        // Release the lock before calling out so listeners may re-enter.
        let snapshot: Vec<TelemetryListener> = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .iter()
            .flatten()
            .map(|slot| slot.listener.clone())
            .collect();

        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }
}

impl std::fmt::Debug for TelemetryBroadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryBroadcast")
            .field("enabled", &self.is_enabled())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn event() -> TelemetryEvent {
        TelemetryEvent::user_prompt("p", 1)
    }

    #[test]
    fn disabled_broadcast_drops_events() {
        let bus = TelemetryBroadcast::new();
        let seen = Arc::new(Mutex::new(0));
        let seen2 = seen.clone();
        bus.subscribe(move |_| *seen2.lock().unwrap() += 1);

        assert_eq!(bus.publish(&event()), 0);
        assert_eq!(*seen.lock().unwrap(), 0);

        bus.enable();
        assert_eq!(bus.publish(&event()), 1);
        assert_eq!(*seen.lock().unwrap(), 1);

        bus.disable();
        bus.publish(&event());
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = TelemetryBroadcast::new();
        bus.enable();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            bus.subscribe(move |_| order.lock().unwrap().push(i));
        }
        bus.publish(&event());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = TelemetryBroadcast::new();
        bus.enable();
        let id = bus.subscribe(|_| {});
        let keep = bus.subscribe(|_| {});
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.listener_count(), 1);
        assert_eq!(bus.publish(&event()), 1);
        assert!(bus.unsubscribe(keep));
        assert_eq!(bus.publish(&event()), 0);
    }

    #[test]
    fn unsubscribe_during_delivery_affects_next_publish() {
        let bus = Arc::new(TelemetryBroadcast::new());
        bus.enable();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let second_id = Arc::new(Mutex::new(None));
        {
            let inner = bus.clone();
            let calls = calls.clone();
            let second_id = second_id.clone();
            bus.subscribe(move |_| {
                calls.lock().unwrap().push("first");
                if let Some(id) = second_id.lock().unwrap().take() {
                    inner.unsubscribe(id);
                }
            });
        }
        {
            let calls = calls.clone();
            let id = bus.subscribe(move |_| calls.lock().unwrap().push("second"));
            *second_id.lock().unwrap() = Some(id);
        }

        assert_eq!(bus.publish(&event()), 2);
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);

        calls.lock().unwrap().clear();
        assert_eq!(bus.publish(&event()), 1);
        assert_eq!(*calls.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn subscribe_during_delivery_waits_for_next_publish() {
        let bus = Arc::new(TelemetryBroadcast::new());
        bus.enable();
        let added = Arc::new(Mutex::new(false));
        {
            let inner = bus.clone();
            let added = added.clone();
            bus.subscribe(move |_| {
                let mut added = added.lock().unwrap();
                if !*added {
                    inner.subscribe(|_| {});
                    *added = true;
                }
            });
        }
        assert_eq!(bus.publish(&event()), 1);
        assert_eq!(bus.publish(&event()), 2);
    }

    #[test]
    fn subscribe_while_disabled_is_allowed() {
        let bus = TelemetryBroadcast::new();
        bus.subscribe(|_| {});
        assert_eq!(bus.listener_count(), 1);
        assert!(!bus.is_enabled());
    }

    #[test]
    fn unsubscribed_slots_do_not_accumulate() {
        let bus = TelemetryBroadcast::new();
        for _ in 0..100 {
            let id = bus.subscribe(|_| {});
            assert!(bus.unsubscribe(id));
        }
        assert_eq!(bus.registry.read().unwrap().slots.len(), 0);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn stale_id_cannot_remove_a_newer_listener() {
        let bus = TelemetryBroadcast::new();
        bus.enable();
        let stale = bus.subscribe(|_| {});
        assert!(bus.unsubscribe(stale));

        let fresh = bus.subscribe(|_| {});
        assert!(!bus.unsubscribe(stale));
        assert_eq!(bus.publish(&event()), 1);
        assert!(bus.unsubscribe(fresh));
    }
}
