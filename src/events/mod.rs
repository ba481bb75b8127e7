use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Publish/subscribe registry owned by a single contract handle.
///
/// Handlers run synchronously on the emitting task, in subscription order.
pub struct EventBus<E> {
    handlers: Arc<DashMap<u64, Handler<E>>>,
    next_id: AtomicU64,
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers `handler` until the returned guard is dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.insert(id, Arc::new(handler));

        let registry: Weak<DashMap<u64, Handler<E>>> = Arc::downgrade(&self.handlers);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(handlers) = registry.upgrade() {
                    handlers.remove(&id);
                }
            })),
        }
    }

    pub fn emit(&self, event: &E) {
        // Snapshot first: a handler may subscribe or unsubscribe while running.
        let mut handlers: Vec<(u64, Handler<E>)> = self
            .handlers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        handlers.sort_by_key(|(id, _)| *id);

        for (_, handler) in handlers {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Unsubscribes its handler when dropped.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_reaches_active_subscribers() {
        let bus: EventBus<u32> = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let sub = bus.subscribe(move |v| {
            counter.fetch_add(*v as usize, Ordering::SeqCst);
        });

        bus.emit(&2);
        bus.emit(&3);
        assert_eq!(hits.load(Ordering::SeqCst), 5);

        drop(sub);
        bus.emit(&10);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus: EventBus<()> = EventBus::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let subs: Vec<Subscription> = (0..5)
            .map(|i| {
                let order = order.clone();
                bus.subscribe(move |_| order.lock().unwrap().push(i))
            })
            .collect();

        bus.emit(&());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        drop(subs);
    }

    #[test]
    fn test_subscription_outliving_bus_is_harmless() {
        let bus: EventBus<()> = EventBus::new();
        let sub = bus.subscribe(|_| {});
        drop(bus);
        sub.unsubscribe();
    }
}
