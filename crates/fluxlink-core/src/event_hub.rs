//! A small multi-listener registry supporting `on`/`once`/`off` with safe
//! error isolation between listeners (spec §2, §8: "listener exceptions do
//! not prevent subsequent listeners from running").
//!
//! This backs both the Source's inner event hub (`message`/`state`/
//! `dispose`) and the lifecycle slots on `SourceChannel`
//! (`ready`/`error`/`close`).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Opaque handle returned by `on`/`once`, needed to `off` a specific
/// listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener<A> {
    id: ListenerId,
    once: bool,
    callback: Arc<dyn Fn(&A) + Send + Sync>,
}

/// A registry of listeners for a single event, all sharing one argument
/// type `A`.
pub struct EventHub<A> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Listener<A>>>,
}

impl<A> EventHub<A> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, once: bool, callback: Arc<dyn Fn(&A) + Send + Sync>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Listener { id, once, callback });
        id
    }

    /// Subscribes a listener that stays registered across every future
    /// emission until explicitly removed with `off`.
    pub fn on(&self, callback: impl Fn(&A) + Send + Sync + 'static) -> ListenerId {
        self.push(false, Arc::new(callback))
    }

    /// Subscribes a listener that is automatically removed after its
    /// first invocation.
    pub fn once(&self, callback: impl Fn(&A) + Send + Sync + 'static) -> ListenerId {
        self.push(true, Arc::new(callback))
    }

    /// Removes a listener. No-op if it was never registered or already
    /// removed (e.g. by firing as a `once` listener).
    pub fn off(&self, id: ListenerId) {
        self.listeners.lock().retain(|l| l.id != id);
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Invokes every listener with `args`, in subscription order. A
    /// listener that panics is caught and logged; subsequent listeners
    /// still run. `once` listeners are removed after this call whether or
    /// not they panicked.
    pub fn emit(&self, args: &A) {
        // Snapshot callbacks (cheap Arc clones) and drop the lock before
        // invoking anything, so a listener that re-enters the hub (e.g.
        // subscribing another listener, or calling `off` on itself) can't
        // deadlock.
        let callbacks: Vec<(ListenerId, bool, Arc<dyn Fn(&A) + Send + Sync>)> = self
            .listeners
            .lock()
            .iter()
            .map(|l| (l.id, l.once, l.callback.clone()))
            .collect();

        for (id, once, callback) in callbacks {
            if let Err(_panic) = catch_unwind(AssertUnwindSafe(|| callback(args))) {
                tracing::warn!("event listener panicked; continuing with remaining listeners");
            }
            if once {
                self.off(id);
            }
        }
    }
}

impl<A> Default for EventHub<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn on_fires_every_time() {
        let hub: EventHub<i32> = EventHub::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        hub.on(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        hub.emit(&1);
        hub.emit(&2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn once_fires_a_single_time() {
        let hub: EventHub<i32> = EventHub::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        hub.once(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        hub.emit(&1);
        hub.emit(&2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(hub.is_empty());
    }

    #[test]
    fn off_removes_listener() {
        let hub: EventHub<i32> = EventHub::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let id = hub.on(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        hub.off(id);
        hub.emit(&1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_listener_does_not_block_the_next_one() {
        let hub: EventHub<i32> = EventHub::new();
        let calls = Arc::new(AtomicUsize::new(0));
        hub.on(|_| panic!("boom"));
        let calls2 = calls.clone();
        hub.on(move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        hub.emit(&1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listeners_invoked_in_subscription_order() {
        let hub: EventHub<i32> = EventHub::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            hub.on(move |_| order.lock().push(i));
        }
        hub.emit(&0);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }
}
