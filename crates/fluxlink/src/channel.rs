//! `Channel`: the Channel endpoint's per-channel client object (§3, §4.5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use fluxlink_core::{EventHub, ListenerId};
use fluxlink_protocol::{ChannelId, ClientMessage, CloseReason, EventPath, ResponseKey, Value};
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};

use crate::error::RpcError;

/// Internal seam a `Channel` uses to reach its owning link: send a wire
/// message, mint a fresh id for a nested channel, and register/forget
/// channels in the link's registry. Implemented by `ChannelEndpoint`.
pub(crate) trait ChannelHub: Send + Sync {
    fn send(&self, message: ClientMessage);
    fn next_channel_id(&self) -> ChannelId;
    fn register(&self, channel: Channel);
    fn unregister(&self, channel_id: &ChannelId);
}

/// A `Weak<dyn ChannelHub>` that never upgrades. `Weak::new()` is only
/// defined for `Sized` types, so a dangling handle to a trait object is
/// built by downgrading an `Arc` that is dropped immediately — used for
/// a `Channel` that has outlived its link (link already gone by the time
/// `create()` runs) and for unit tests that only exercise local state.
pub(crate) fn dead_hub() -> Weak<dyn ChannelHub> {
    struct NullHub;
    impl ChannelHub for NullHub {
        fn send(&self, _message: ClientMessage) {}
        fn next_channel_id(&self) -> ChannelId {
            ChannelId::from("")
        }
        fn register(&self, _channel: Channel) {}
        fn unregister(&self, _channel_id: &ChannelId) {}
    }
    let arc: Arc<dyn ChannelHub> = Arc::new(NullHub);
    Arc::downgrade(&arc)
}

/// `(new, old)` delivered to `state` listeners after the first update;
/// the very first `STATE` fires with `old = None` via `on_ready` ordering
/// (§5: "`ready` fires before the first `state` listener invocation").
#[derive(Clone, Debug, PartialEq)]
pub struct StateChange {
    pub new: Value,
    pub old: Option<Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Readiness {
    Pending,
    Ready,
    Closed,
}

struct Inner {
    channel_id: ChannelId,
    hub: Weak<dyn ChannelHub>,
    state: Mutex<Option<Value>>,
    readiness: watch::Sender<Readiness>,
    close_reason: Mutex<Option<CloseReason>>,
    ready_hub: EventHub<()>,
    error_hub: EventHub<CloseReason>,
    close_hub: EventHub<CloseReason>,
    state_hub: EventHub<StateChange>,
    event_hubs: Mutex<HashMap<String, Arc<EventHub<Vec<Value>>>>>,
    pending_calls: Mutex<HashMap<ResponseKey, oneshot::Sender<Result<Value, RpcError>>>>,
    next_call_id: AtomicU64,
    was_ready: AtomicBool,
}

/// A reference-counted handle to one channel. Cloning shares the same
/// underlying object; `ChannelEndpoint` holds the canonical copy in its
/// registry, application code holds clones.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    pub(crate) fn new(channel_id: ChannelId, hub: Weak<dyn ChannelHub>) -> Self {
        let (readiness, _) = watch::channel(Readiness::Pending);
        Self {
            inner: Arc::new(Inner {
                channel_id,
                hub,
                state: Mutex::new(None),
                readiness,
                close_reason: Mutex::new(None),
                ready_hub: EventHub::new(),
                error_hub: EventHub::new(),
                close_hub: EventHub::new(),
                state_hub: EventHub::new(),
                event_hubs: Mutex::new(HashMap::new()),
                pending_calls: Mutex::new(HashMap::new()),
                next_call_id: AtomicU64::new(1),
                was_ready: AtomicBool::new(false),
            }),
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.inner.channel_id
    }

    pub fn state(&self) -> Option<Value> {
        self.inner.state.lock().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.readiness.borrow() == Readiness::Ready
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.readiness.borrow() == Readiness::Closed
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.inner.close_reason.lock().clone()
    }

    /// Resolves once the channel becomes ready, or rejects with the close
    /// reason if it closes before ever becoming ready (§4.2's readiness
    /// promise).
    pub async fn ready(&self) -> Result<(), CloseReason> {
        let mut rx = self.inner.readiness.subscribe();
        loop {
            match *rx.borrow() {
                Readiness::Ready => return Ok(()),
                Readiness::Closed => {
                    return Err(self
                        .inner
                        .close_reason
                        .lock()
                        .clone()
                        .unwrap_or_else(|| CloseReason::from("closed")))
                }
                Readiness::Pending => {}
            }
            if rx.changed().await.is_err() {
                return Err(CloseReason::from("link closed"));
            }
        }
    }

    pub fn on_ready(&self, listener: impl Fn(&()) + Send + Sync + 'static) -> ListenerId {
        self.inner.ready_hub.on(listener)
    }

    pub fn on_error(&self, listener: impl Fn(&CloseReason) + Send + Sync + 'static) -> ListenerId {
        self.inner.error_hub.on(listener)
    }

    pub fn on_close(&self, listener: impl Fn(&CloseReason) + Send + Sync + 'static) -> ListenerId {
        self.inner.close_hub.on(listener)
    }

    pub fn on_state(&self, listener: impl Fn(&StateChange) + Send + Sync + 'static) -> ListenerId {
        self.inner.state_hub.on(listener)
    }

    /// Subscribes to a built-in lifecycle event by bare name (`"ready"`,
    /// `"error"`, `"close"`, `"state"`) or, for any other name, a custom
    /// event with no path prefix (§4.6). Built-in names key on the
    /// literal string; everything else is wrapped as a one-segment path
    /// and JSON-encoded, so a custom `"state"` event (subscribed via
    /// `on(EventPath::new(vec![...]), ...)`) never collides with this.
    pub fn on_named(&self, name: &str, listener: impl Fn(&Vec<Value>) + Send + Sync + 'static) -> ListenerId {
        let path = EventPath::new(vec![name.into()]);
        if let Some(builtin) = path.is_builtin_name() {
            match builtin {
                "ready" => return self.on_ready(move |_| listener(&Vec::new())),
                "error" => return self.on_error(move |r| listener(&vec![Value::Str(r.as_str().to_string())])),
                "close" => return self.on_close(move |r| listener(&vec![Value::Str(r.as_str().to_string())])),
                "state" => {
                    return self.on_state(move |change| listener(&vec![change.new.clone()]));
                }
                _ => unreachable!(),
            }
        }
        self.on(path, listener)
    }

    /// Subscribes to a custom event at an explicit path (§4.6). Always
    /// keys on the JSON-encoded canonical key, even for a single segment
    /// matching a built-in name — this is how `["state"]` stays distinct
    /// from the built-in state update.
    pub fn on(&self, path: EventPath, listener: impl Fn(&Vec<Value>) + Send + Sync + 'static) -> ListenerId {
        let key = path.canonical_key();
        let mut hubs = self.inner.event_hubs.lock();
        let hub = hubs.entry(key).or_insert_with(|| Arc::new(EventHub::new()));
        hub.on(listener)
    }

    fn dispatch_event(&self, path: &EventPath, args: Vec<Value>) {
        let key = path.canonical_key();
        let hub = self.inner.event_hubs.lock().get(&key).cloned();
        if let Some(hub) = hub {
            hub.emit(&args);
        }
    }

    /// Calls a remote method and awaits its response (§4.5 "Call").
    pub async fn call(&self, path: EventPath, args: Vec<Value>) -> Result<Value, RpcError> {
        let Some(hub) = self.inner.hub.upgrade() else {
            return Err(RpcError::closed(CloseReason::from("link closed")));
        };
        if self.is_closed() {
            return Err(RpcError::closed(
                self.close_reason().unwrap_or_else(|| CloseReason::from("closed")),
            ));
        }
        let response_key = ResponseKey(self.inner.next_call_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.inner.pending_calls.lock().insert(response_key, tx);
        hub.send(ClientMessage::Call {
            channel_id: self.inner.channel_id.clone(),
            response_key,
            path,
            args,
        });
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(RpcError::closed(
                self.close_reason().unwrap_or_else(|| CloseReason::from("closed")),
            )),
        }
    }

    /// Fire-and-forget call; discards any error (§4.5 "Notify").
    pub fn notify(&self, path: EventPath, args: Vec<Value>) {
        if let Some(hub) = self.inner.hub.upgrade() {
            hub.send(ClientMessage::Notify {
                channel_id: self.inner.channel_id.clone(),
                path,
                args,
            });
        }
    }

    /// Opens a nested channel bound to whatever the handler resolves
    /// `path` to on the Source side (§4.5 "Create nested channel").
    /// Returns the new local `Channel` immediately; its readiness
    /// resolves on a future `STATE` or `CLOSE` for its id.
    pub fn create(&self, path: EventPath, args: Vec<Value>) -> Channel {
        let Some(hub) = self.inner.hub.upgrade() else {
            let dead = Channel::new(ChannelId::from(""), dead_hub());
            dead.close_locally(CloseReason::from("link closed"));
            return dead;
        };
        let new_id = hub.next_channel_id();
        let child = Channel::new(new_id.clone(), Arc::downgrade(&hub));
        hub.register(child.clone());
        hub.send(ClientMessage::Create {
            channel_id: self.inner.channel_id.clone(),
            new_channel_id: new_id,
            path,
            args,
        });
        child
    }

    /// Closes this channel locally: sends `CLOSE`, fires `close`, rejects
    /// readiness/pending calls, and unregisters from the link (§4.5
    /// "Close"). Idempotent.
    pub fn close(&self, reason: CloseReason) {
        if !self.close_locally(reason.clone()) {
            return;
        }
        if let Some(hub) = self.inner.hub.upgrade() {
            hub.send(ClientMessage::Close {
                channel_id: self.inner.channel_id.clone(),
                reason: reason.into(),
            });
            hub.unregister(&self.inner.channel_id);
        }
    }

    /// Applies an inbound `STATE` (§4.5).
    pub(crate) fn apply_state(&self, value: Value) {
        let old = self.inner.state.lock().replace(value.clone());
        let was_ready = self.inner.was_ready.swap(true, Ordering::AcqRel);
        if !was_ready {
            let _ = self.inner.readiness.send(Readiness::Ready);
            self.inner.ready_hub.emit(&());
        }
        self.inner.state_hub.emit(&StateChange { new: value, old });
    }

    pub(crate) fn apply_event(&self, path: EventPath, args: Vec<Value>) {
        self.dispatch_event(&path, args);
    }

    pub(crate) fn resolve_call(&self, response_key: ResponseKey, result: Result<Value, RpcError>) {
        if let Some(tx) = self.inner.pending_calls.lock().remove(&response_key) {
            let _ = tx.send(result);
        }
    }

    /// Applies a peer-initiated or link-wide close. Returns `true` the
    /// first time (the signal that registry/unregister bookkeeping still
    /// needs to happen), `false` on repeat.
    pub(crate) fn close_locally(&self, reason: CloseReason) -> bool {
        let already_closed = *self.inner.readiness.borrow() == Readiness::Closed;
        if already_closed {
            return false;
        }
        let was_ready = *self.inner.readiness.borrow() == Readiness::Ready;
        *self.inner.close_reason.lock() = Some(reason.clone());
        let _ = self.inner.readiness.send(Readiness::Closed);
        if !was_ready {
            self.inner.error_hub.emit(&reason);
        }
        self.inner.close_hub.emit(&reason);
        for (_, tx) in self.inner.pending_calls.lock().drain() {
            let _ = tx.send(Err(RpcError::Closed(reason.clone())));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio_test_lite::test]
    async fn ready_then_state_ordering() {
        let channel = Channel::new(ChannelId::from("c"), dead_hub());
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        channel.on_ready(move |_| o1.lock().push("ready"));
        let o2 = order.clone();
        channel.on_state(move |_| o2.lock().push("state"));
        channel.apply_state(Value::Int(1));
        assert_eq!(*order.lock(), vec!["ready", "state"]);
        assert!(channel.is_ready());
        assert_eq!(channel.state(), Some(Value::Int(1)));
    }

    #[tokio_test_lite::test]
    async fn second_state_carries_old_value() {
        let channel = Channel::new(ChannelId::from("c"), dead_hub());
        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        channel.on_state(move |change| *seen2.lock() = Some(change.clone()));
        channel.apply_state(Value::Int(1));
        channel.apply_state(Value::Int(2));
        let change = seen.lock().clone().unwrap();
        assert_eq!(change.new, Value::Int(2));
        assert_eq!(change.old, Some(Value::Int(1)));
    }

    #[tokio_test_lite::test]
    async fn close_before_ready_rejects_readiness() {
        let channel = Channel::new(ChannelId::from("c"), dead_hub());
        channel.close_locally(CloseReason::from("nope"));
        assert_eq!(channel.ready().await, Err(CloseReason::from("nope")));
    }

    #[tokio_test_lite::test]
    async fn custom_state_named_event_is_distinct_from_builtin() {
        let channel = Channel::new(ChannelId::from("c"), dead_hub());
        let custom_calls = Arc::new(Mutex::new(0));
        let c2 = custom_calls.clone();
        channel.on(EventPath::new(vec!["state".into()]), move |_| {
            *c2.lock() += 1;
        });
        channel.apply_state(Value::Int(5));
        assert_eq!(*custom_calls.lock(), 0);
        channel.apply_event(EventPath::new(vec!["state".into()]), vec![Value::Int(9)]);
        assert_eq!(*custom_calls.lock(), 1);
    }
}
