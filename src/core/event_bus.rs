//! Typed pub/sub bus for view notifications.
//!
//! - `subscribe::<E>` registers a callback, invoked synchronously by `emit`
//! - `emit` also records the event so hosts without callbacks can `drain` later
//!
//! Callbacks for one event type run in subscription order. The recorded backlog
//! is bounded; the oldest half is dropped when it fills up.

use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use log::debug;

/// Backlog length before eviction.
const MAX_BACKLOG: usize = 1000;

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;
type Recorded = Box<dyn Any + Send + Sync>;

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<TypeId, Vec<Callback>>>>,
    backlog: Arc<Mutex<VecDeque<Recorded>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_types", &self.subscribers.read().map(|s| s.len()).unwrap_or(0))
            .field("backlog", &self.backlog_len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Any + Send + Sync,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    /// Invoke subscribers, then record the event.
    pub fn emit<E>(&self, event: E)
    where
        E: Any + Send + Sync + Clone,
    {
        // Clone the callback list so a callback may subscribe without deadlocking.
        let callbacks: Vec<Callback> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .cloned()
            .unwrap_or_default();
        for cb in &callbacks {
            cb(&event);
        }

        let mut backlog = self.backlog.lock().unwrap_or_else(|e| e.into_inner());
        if backlog.len() >= MAX_BACKLOG {
            let evict = backlog.len() / 2;
            debug!("EventBus backlog full ({} events), dropping oldest {}", backlog.len(), evict);
            backlog.drain(..evict);
        }
        backlog.push_back(Box::new(event));
    }

    /// Take every recorded event of type `E`, in emission order. Events of
    /// other types stay recorded.
    pub fn drain<E>(&self) -> Vec<E>
    where
        E: Any + Send + Sync,
    {
        let mut backlog = self.backlog.lock().unwrap_or_else(|e| e.into_inner());
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(backlog.len());
        for recorded in backlog.drain(..) {
            match recorded.downcast::<E>() {
                Ok(event) => taken.push(*event),
                Err(other) => kept.push_back(other),
            }
        }
        *backlog = kept;
        taken
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn has_subscribers<E: Any>(&self) -> bool {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .is_some_and(|v| !v.is_empty())
    }

    pub fn unsubscribe_all<E: Any>(&self) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<E>());
    }

    pub fn clear(&self) {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.backlog.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[derive(Clone, Debug, PartialEq)]
    struct Tick(i32);

    #[derive(Clone, Debug)]
    struct Other;

    #[test]
    fn test_subscribe_emit_immediate() {
        let bus = EventBus::new();
        let total = Arc::new(AtomicI32::new(0));
        let t = Arc::clone(&total);
        bus.subscribe::<Tick, _>(move |e| {
            t.fetch_add(e.0, Ordering::SeqCst);
        });

        bus.emit(Tick(10));
        bus.emit(Tick(5));
        assert_eq!(total.load(Ordering::SeqCst), 15);
        assert!(bus.has_subscribers::<Tick>());
        assert!(!bus.has_subscribers::<Other>());
    }

    #[test]
    fn test_drain_is_typed() {
        let bus = EventBus::new();
        bus.emit(Tick(1));
        bus.emit(Other);
        bus.emit(Tick(2));

        assert_eq!(bus.drain::<Tick>(), vec![Tick(1), Tick(2)]);
        assert_eq!(bus.backlog_len(), 1);
        assert_eq!(bus.drain::<Other>().len(), 1);
        assert_eq!(bus.backlog_len(), 0);
    }

    #[test]
    fn test_subscribe_from_callback() {
        let bus = EventBus::new();
        let inner = bus.clone();
        bus.subscribe::<Tick, _>(move |_| inner.subscribe::<Other, _>(|_| {}));
        bus.emit(Tick(0));
        assert!(bus.has_subscribers::<Other>());
    }

    #[test]
    fn test_backlog_eviction() {
        let bus = EventBus::new();
        for i in 0..(MAX_BACKLOG as i32 + 1) {
            bus.emit(Tick(i));
        }
        let left = bus.drain::<Tick>();
        assert_eq!(left.len(), MAX_BACKLOG / 2 + 1);
        assert_eq!(left.last(), Some(&Tick(MAX_BACKLOG as i32)));
    }

    #[test]
    fn test_unsubscribe_and_clear() {
        let bus = EventBus::new();
        bus.subscribe::<Tick, _>(|_| {});
        bus.unsubscribe_all::<Tick>();
        assert!(!bus.has_subscribers::<Tick>());

        bus.emit(Tick(1));
        bus.clear();
        assert_eq!(bus.backlog_len(), 0);
    }
}
