//! Subscription and notification bus.
//!
//! A multimap from [`ResourceKey`] to listeners. The store queues every
//! affected key while it holds its lock and hands the queue to
//! [`SubscriptionBus::deliver`] once the lock is released, so listeners may
//! call back into the store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::entry::EntryStatus;
use crate::key::ResourceKey;

/// Delivered to listeners once per logical change of an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub key: ResourceKey,
    pub status: EntryStatus,
}

pub type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

pub(crate) type ListenerId = u64;

struct Registration {
    listener: Listener,
    active: Arc<AtomicBool>,
}

/// Listener registry keyed by resource.
#[derive(Default)]
pub struct SubscriptionBus {
    next_id: ListenerId,
    listeners: HashMap<ResourceKey, BTreeMap<ListenerId, Registration>>,
}

impl SubscriptionBus {
    pub(crate) fn add(&mut self, key: &ResourceKey, listener: Listener) -> (ListenerId, Arc<AtomicBool>) {
        self.next_id += 1;
        let id = self.next_id;
        let active = Arc::new(AtomicBool::new(true));
        self.listeners.entry(key.clone()).or_default().insert(
            id,
            Registration {
                listener,
                active: Arc::clone(&active),
            },
        );
        (id, active)
    }

    /// Returns the number of listeners left on `key`.
    pub(crate) fn remove(&mut self, key: &ResourceKey, id: ListenerId) -> usize {
        let Some(registrations) = self.listeners.get_mut(key) else {
            return 0;
        };
        if let Some(registration) = registrations.remove(&id) {
            registration.active.store(false, Ordering::SeqCst);
        }
        let remaining = registrations.len();
        if remaining == 0 {
            self.listeners.remove(key);
        }
        remaining
    }

    pub fn count(&self, key: &ResourceKey) -> usize {
        self.listeners.get(key).map(BTreeMap::len).unwrap_or(0)
    }

    /// Snapshot the listeners for a batch of events, in registration order.
    pub(crate) fn collect(&self, events: Vec<ChangeEvent>) -> Vec<Delivery> {
        events
            .into_iter()
            .filter_map(|event| {
                let registrations = self.listeners.get(&event.key)?;
                let targets = registrations
                    .values()
                    .map(|r| (Arc::clone(&r.listener), Arc::clone(&r.active)))
                    .collect::<Vec<_>>();
                Some(Delivery { event, targets })
            })
            .collect()
    }

    /// Call every listener collected for the events.
    ///
    /// A listener unsubscribed after collection is skipped.
    pub(crate) fn deliver(deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            for (listener, active) in delivery.targets {
                if active.load(Ordering::SeqCst) {
                    listener(&delivery.event);
                }
            }
        }
    }
}

pub(crate) struct Delivery {
    event: ChangeEvent,
    targets: Vec<(Listener, Arc<AtomicBool>)>,
}

/// Implemented by the owner of a bus so subscriptions can detach themselves.
pub(crate) trait Release: Send + Sync {
    fn release(&self, key: &ResourceKey, id: ListenerId);
}

/// Handle for one listener. Dropping it unsubscribes.
pub struct Subscription {
    owner: Weak<dyn Release>,
    key: ResourceKey,
    id: ListenerId,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub(crate) fn new(
        owner: Weak<dyn Release>,
        key: ResourceKey,
        id: ListenerId,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            owner,
            key,
            id,
            active,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop receiving notifications. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(owner) = self.owner.upgrade() {
            owner.release(&self.key, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn event(kind: &str) -> ChangeEvent {
        ChangeEvent {
            key: ResourceKey::unit(kind),
            status: EntryStatus::Valid,
        }
    }

    #[test]
    fn deliveries_follow_registration_order() {
        let mut bus = SubscriptionBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.add(
                &ResourceKey::unit("profile"),
                Arc::new(move |_| seen.lock().unwrap().push(label)),
            );
        }
        SubscriptionBus::deliver(bus.collect(vec![event("profile")]));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn deactivated_listener_is_skipped_even_if_collected() {
        let mut bus = SubscriptionBus::default();
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let key = ResourceKey::unit("profile");
        let (id, _) = bus.add(&key, Arc::new(move |_| *counter.lock().unwrap() += 1));
        let deliveries = bus.collect(vec![event("profile")]);
        assert_eq!(bus.remove(&key, id), 0);
        SubscriptionBus::deliver(deliveries);
        assert_eq!(*calls.lock().unwrap(), 0);
        assert_eq!(bus.count(&key), 0);
    }

    #[test]
    fn events_without_listeners_are_dropped() {
        let bus = SubscriptionBus::default();
        assert!(bus.collect(vec![event("nobody")]).is_empty());
    }
}
