//! `SourceChannel`: one accepted channel from the Source endpoint's side
//! (§3, §4.2).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use fluxlink_protocol::{ChannelId, CloseReason, EventPath, Value};

use crate::event_hub::EventHub;
use crate::handler::Context;
use crate::source::Source;

/// Internal seam a `SourceChannel` uses to write an `EVENT` addressed to
/// only itself (§4.2 "single-recipient emit"). Implemented by
/// `SourceEndpoint`, which owns the outbound sink every channel on its
/// link ultimately writes through.
pub(crate) trait EmitSink: Send + Sync {
    fn emit_to(&self, channel_id: &ChannelId, path: EventPath, args: Vec<Value>);
}

/// A `Weak<dyn EmitSink>` that never upgrades, for a `SourceChannel` built
/// without a live endpoint (unit tests). Mirrors `fluxlink::channel::dead_hub`.
pub(crate) fn dead_sink() -> Weak<dyn EmitSink> {
    struct NullSink;
    impl EmitSink for NullSink {
        fn emit_to(&self, _channel_id: &ChannelId, _path: EventPath, _args: Vec<Value>) {}
    }
    let arc: Arc<dyn EmitSink> = Arc::new(NullSink);
    Arc::downgrade(&arc)
}

struct Inner {
    channel_id: ChannelId,
    source: Source,
    context: Context,
    emit_sink: Weak<dyn EmitSink>,
    ready: AtomicBool,
    closed: AtomicBool,
    close_reason: parking_lot::Mutex<Option<CloseReason>>,
    auto_dispose: AtomicBool,
    ready_hub: EventHub<()>,
    error_hub: EventHub<CloseReason>,
    close_hub: EventHub<CloseReason>,
}

/// A reference-counted handle to one Source Channel. `SourceEndpoint`
/// holds the canonical copy in its channel registry; application code
/// (constructors, method bodies) receives clones through `MethodContext`.
#[derive(Clone)]
pub struct SourceChannel {
    inner: Arc<Inner>,
}

impl SourceChannel {
    pub fn new(channel_id: ChannelId, source: Source, context: Context) -> Self {
        Self::with_emit_sink(channel_id, source, context, dead_sink())
    }

    pub(crate) fn with_emit_sink(
        channel_id: ChannelId,
        source: Source,
        context: Context,
        emit_sink: Weak<dyn EmitSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                channel_id,
                source,
                context,
                emit_sink,
                ready: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                close_reason: parking_lot::Mutex::new(None),
                auto_dispose: AtomicBool::new(false),
                ready_hub: EventHub::new(),
                error_hub: EventHub::new(),
                close_hub: EventHub::new(),
            }),
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.inner.channel_id
    }

    pub fn source(&self) -> &Source {
        &self.inner.source
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.inner.close_reason.lock().clone()
    }

    pub fn auto_dispose(&self) -> bool {
        self.inner.auto_dispose.load(Ordering::Acquire)
    }

    /// Tags this channel for auto-dispose (§4.2, set by the default
    /// handler's constructor path when the constructor opted in).
    pub fn set_auto_dispose(&self, value: bool) {
        self.inner.auto_dispose.store(value, Ordering::Release);
    }

    pub fn on_ready(&self, listener: impl Fn(&()) + Send + Sync + 'static) {
        self.inner.ready_hub.on(listener);
    }

    pub fn on_error(&self, listener: impl Fn(&CloseReason) + Send + Sync + 'static) {
        self.inner.error_hub.on(listener);
    }

    pub fn on_close(&self, listener: impl Fn(&CloseReason) + Send + Sync + 'static) {
        self.inner.close_hub.on(listener);
    }

    /// Marks the channel ready and fires its local `ready` event (§4.4
    /// step 7). No-op if already closed.
    pub fn mark_ready(&self) {
        if self.is_closed() {
            return;
        }
        self.inner.ready.store(true, Ordering::Release);
        self.inner.ready_hub.emit(&());
    }

    /// Closes this channel locally. Idempotent (§4.2, §8
    /// round-trip/idempotence). Fires `error` only when the channel was
    /// never ready, and always fires `close`. Returns `true` the first
    /// time this is called (the signal for the caller to also send a
    /// wire `CLOSE` and unwind registry bookkeeping), `false` on repeat
    /// calls.
    pub fn close(&self, reason: CloseReason) -> bool {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let was_ready = self.inner.ready.load(Ordering::Acquire);
        *self.inner.close_reason.lock() = Some(reason.clone());
        if !was_ready {
            self.inner.error_hub.emit(&reason);
        }
        self.inner.close_hub.emit(&reason);
        true
    }

    /// Sends a user event to this single channel only (§4.2, §2 item 5
    /// "Supports single-recipient emit"). A no-op once closed, mirroring
    /// `Source::emit`'s "rejected if disposed" rule.
    pub fn emit(&self, path: EventPath, args: Vec<Value>) {
        if self.is_closed() {
            return;
        }
        if let Some(sink) = self.inner.emit_sink.upgrade() {
            sink.emit_to(&self.inner.channel_id, path, args);
        }
    }
}
