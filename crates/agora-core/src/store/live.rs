//! Reactive read handles over the notification store.
//!
//! Mutations publish change events scoped by owner; a subscription registry
//! delivers the current snapshot immediately on subscribe and again on every
//! subsequent matching mutation. Dropping (or explicitly unsubscribing) a
//! handle removes the registry entry. Callbacks run outside the registry
//! lock, so a callback may mutate the store (each mutation re-delivers); a
//! handle dropped concurrently with a mutation may observe one final
//! delivery.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::models::NotificationRecord;

pub type ListCallback = Arc<dyn Fn(&[NotificationRecord]) + Send + Sync>;
pub type CountCallback = Arc<dyn Fn(u64) + Send + Sync>;

#[derive(Clone)]
enum SubscriberKind {
    List { limit: usize, cb: ListCallback },
    Count { cb: CountCallback },
}

struct Subscriber {
    owner: String,
    kind: SubscriberKind,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    subs: HashMap<u64, Subscriber>,
}

#[derive(Clone, Default)]
pub(crate) struct LiveRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl LiveRegistry {
    pub(crate) fn register_list(&self, owner: String, limit: usize, cb: ListCallback) -> Subscription {
        self.register(Subscriber {
            owner,
            kind: SubscriberKind::List { limit, cb },
        })
    }

    pub(crate) fn register_count(&self, owner: String, cb: CountCallback) -> Subscription {
        self.register(Subscriber {
            owner,
            kind: SubscriberKind::Count { cb },
        })
    }

    fn register(&self, sub: Subscriber) -> Subscription {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subs.insert(id, sub);
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver a mutation for `owner` to every matching subscriber.
    /// `fetch` re-queries the snapshot at each list subscriber's own limit.
    /// Subscribers are collected under the lock but called after it is
    /// released, so callbacks may mutate the store without deadlocking.
    pub(crate) fn notify<F>(&self, owner: &str, fetch: F, unread: u64)
    where
        F: Fn(usize) -> Vec<NotificationRecord>,
    {
        let pending: Vec<SubscriberKind> = {
            let inner = self.inner.lock();
            inner
                .subs
                .values()
                .filter(|s| s.owner == owner)
                .map(|s| s.kind.clone())
                .collect()
        };
        for kind in pending {
            match kind {
                SubscriberKind::List { limit, cb } => cb(&fetch(limit)),
                SubscriberKind::Count { cb } => cb(unread),
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().subs.len()
    }
}

/// Handle returned by `live_notifications` / `live_unread_count`.
/// Stops delivery when dropped or explicitly unsubscribed.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Inner>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.cancel();
    }

    fn cancel(&self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.lock().subs.remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
