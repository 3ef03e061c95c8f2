//! `Source`: the server-side object a Channel connects to (§2, §4.2).
//!
//! A Source owns a current state value, a handler tree reachable through
//! `call`/`notify`/`create`, and three inner listener slots that
//! `SourceEndpoint` wires up to the wire protocol: `message` (emitted
//! events, fanned out to every subscribed channel), `state` (state
//! replacement, fanned out as a STATE frame) and `dispose` (fired exactly
//! once, tears down every subscription to this Source).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fluxlink_protocol::{CloseReason, EventPath, Value};

use crate::event_hub::{EventHub, ListenerId};
use crate::handler::HandlerNode;

/// Arguments delivered to a Source's `message` listeners: the event path
/// it was emitted under, and its positional arguments.
pub type MessageArgs = (EventPath, Vec<Value>);

/// Cheap identity key for a Source, used by the Subscriber Map (§3):
/// two `Source` handles compare equal here iff they share the same
/// underlying object, regardless of state/handler contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceId(usize);

struct Inner {
    handler: HandlerNode,
    state: parking_lot::Mutex<Value>,
    disposed: AtomicBool,
    dispose_reason: parking_lot::Mutex<Option<CloseReason>>,
    message_hub: EventHub<MessageArgs>,
    state_hub: EventHub<Value>,
    dispose_hub: EventHub<CloseReason>,
}

/// A reference-counted handle to a Source. Cloning shares the same
/// underlying object; a Source is typically held by the application and
/// by every `SourceEndpoint` it is currently reachable from.
#[derive(Clone)]
pub struct Source {
    inner: Arc<Inner>,
}

impl Source {
    pub fn new(handler: HandlerNode, initial_state: Value) -> Self {
        Self {
            inner: Arc::new(Inner {
                handler,
                state: parking_lot::Mutex::new(initial_state),
                disposed: AtomicBool::new(false),
                dispose_reason: parking_lot::Mutex::new(None),
                message_hub: EventHub::new(),
                state_hub: EventHub::new(),
                dispose_hub: EventHub::new(),
            }),
        }
    }

    pub fn handler(&self) -> &HandlerNode {
        &self.inner.handler
    }

    pub fn id(&self) -> SourceId {
        SourceId(Arc::as_ptr(&self.inner) as usize)
    }

    pub fn state(&self) -> Value {
        self.inner.state.lock().clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// The reason passed to `dispose`, once it has fired. `None` before
    /// disposal. Used to reject channels opened against this Source after
    /// the fact with the same stored reason (§3, §8 scenario 8).
    pub fn dispose_reason(&self) -> Option<CloseReason> {
        self.inner.dispose_reason.lock().clone()
    }

    /// Replaces the current state and notifies every subscriber. A no-op
    /// once disposed (§4.2: a disposed Source never emits again). If
    /// `value` equals the current state, no notification is sent (§4.1,
    /// §8 "setState(v) where v is reference-equal to current state emits
    /// no STATE message" — `Value` is a plain data type here, so
    /// structural equality stands in for the original's reference
    /// equality).
    pub fn set_state(&self, value: Value) {
        if self.is_disposed() {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            if *state == value {
                return;
            }
            *state = value.clone();
        }
        self.inner.state_hub.emit(&value);
    }

    /// Applies `f` to the current state and stores the result, under the
    /// same no-op-if-unchanged/no-op-if-disposed rules as `set_state`
    /// (§4.1 "if callable, apply it to current state").
    pub fn update_state(&self, f: impl FnOnce(&Value) -> Value) {
        if self.is_disposed() {
            return;
        }
        let next = {
            let state = self.inner.state.lock();
            f(&state)
        };
        self.set_state(next);
    }

    /// Emits an application event at `path` with `args`, fanned out to
    /// every channel subscribed to this Source. A no-op once disposed.
    pub fn emit(&self, path: EventPath, args: Vec<Value>) {
        if self.is_disposed() {
            return;
        }
        self.inner.message_hub.emit(&(path, args));
    }

    /// Subscribes to emitted events. Returns a handle for `off_message`.
    pub fn on_message(&self, listener: impl Fn(&MessageArgs) + Send + Sync + 'static) -> ListenerId {
        self.inner.message_hub.on(listener)
    }

    pub fn off_message(&self, id: ListenerId) {
        self.inner.message_hub.off(id);
    }

    /// Subscribes to state replacement. Returns a handle for `off_state`.
    pub fn on_state(&self, listener: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        self.inner.state_hub.on(listener)
    }

    pub fn off_state(&self, id: ListenerId) {
        self.inner.state_hub.off(id);
    }

    /// Subscribes to disposal. Fires at most once per Source.
    pub fn on_dispose(&self, listener: impl Fn(&CloseReason) + Send + Sync + 'static) -> ListenerId {
        self.inner.dispose_hub.on(listener)
    }

    pub fn off_dispose(&self, id: ListenerId) {
        self.inner.dispose_hub.off(id);
    }

    /// Marks the Source disposed and fires `dispose` listeners exactly
    /// once. Subsequent calls are no-ops (§4.2, §8 dispose-propagation
    /// scenario).
    pub fn dispose(&self, reason: CloseReason) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.inner.dispose_reason.lock() = Some(reason.clone());
        self.inner.dispose_hub.emit(&reason);
    }
}
