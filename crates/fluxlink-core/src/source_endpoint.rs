//! `SourceEndpoint`: the Source side's dispatch loop (§4.3, §4.4).
//!
//! Transport-agnostic by design: the endpoint decodes already-typed
//! `ClientMessage`s and produces `SourceMessage`s through an injected
//! `OutboundSink`, never touching bytes or a runtime. The `fluxlink`
//! crate wires this to an actual transport.

use std::collections::HashMap;
use std::sync::Arc;

use fluxlink_protocol::{
    reasons, ChannelId, ClientMessage, CloseReason, EventPath, ResponseKey, SourceMessage, Value,
};
use fluxlink_registry::{ChannelRegistry, SubscriberMap, UnsubscribeOutcome};
use parking_lot::Mutex;

use crate::event_hub::ListenerId;
use crate::handler::{classify, walk, Context, HandlerResult, MethodContext, ResolvedTarget};
use crate::source::{Source, SourceId};
use crate::source_channel::{EmitSink, SourceChannel};

/// Where a `SourceEndpoint` sends outbound messages. Implementations are
/// expected to be cheap to call and non-blocking (e.g. push onto a
/// channel drained by the transport's write loop) — §4.3's "outbound
/// messages sent before the transport adapter returns its send function
/// are queued and flushed in order" is the caller's responsibility, not
/// this type's.
pub trait OutboundSink: Send + Sync {
    fn send(&self, message: SourceMessage);
}

impl<F: Fn(SourceMessage) + Send + Sync> OutboundSink for F {
    fn send(&self, message: SourceMessage) {
        self(message)
    }
}

/// Per-link configuration for a `SourceEndpoint` (§6.3).
pub struct SourceEndpointConfig {
    pub max_channels_per_client: Option<usize>,
    pub context: Context,
    pub on_create_channel: Option<Arc<dyn Fn(&SourceChannel, Option<&SourceChannel>) + Send + Sync>>,
}

impl SourceEndpointConfig {
    pub fn new(context: Context) -> Self {
        Self {
            max_channels_per_client: None,
            context,
            on_create_channel: None,
        }
    }
}

struct InnerListeners {
    message: ListenerId,
    state: ListenerId,
    dispose: ListenerId,
}

/// Bookkeeping a Source endpoint owns exclusively for its link (§3
/// Ownership): the channel registry, the subscriber map, and the
/// per-Source inner-listener handles they imply.
struct LinkState {
    channels: ChannelRegistry<SourceChannel>,
    subscribers: SubscriberMap<SourceId>,
    inner_listeners: HashMap<SourceId, InnerListeners>,
    sources_by_id: HashMap<SourceId, Source>,
}

impl LinkState {
    fn new() -> Self {
        Self {
            channels: ChannelRegistry::new(),
            subscribers: SubscriberMap::new(),
            inner_listeners: HashMap::new(),
            sources_by_id: HashMap::new(),
        }
    }
}

pub struct SourceEndpoint<S: OutboundSink> {
    root: Source,
    sink: S,
    config: SourceEndpointConfig,
    state: Mutex<LinkState>,
}

impl<S: OutboundSink + 'static> SourceEndpoint<S> {
    pub fn new(root: Source, sink: S, config: SourceEndpointConfig) -> Self {
        Self {
            root,
            sink,
            config,
            state: Mutex::new(LinkState::new()),
        }
    }

    /// Dispatches one decoded inbound message (§4.3). The async-ness
    /// comes entirely from awaiting a user handler during `CALL`/`CREATE`.
    pub async fn dispatch(self: &Arc<Self>, message: ClientMessage) {
        match message {
            ClientMessage::Initialize { channel_id } => {
                self.initialize_channel(channel_id, self.root.clone(), None).await;
            }
            ClientMessage::Call {
                channel_id,
                response_key,
                path,
                args,
            } => self.handle_call(channel_id, response_key, path, args).await,
            ClientMessage::Notify { channel_id, path, args } => {
                self.handle_notify(channel_id, path, args).await
            }
            ClientMessage::Close { channel_id, reason } => {
                self.handle_peer_close(channel_id, CloseReason::from(reason))
            }
            ClientMessage::Create {
                channel_id,
                new_channel_id,
                path,
                args,
            } => self.handle_create(channel_id, new_channel_id, path, args).await,
        }
    }

    fn find_channel(&self, id: &ChannelId) -> Option<SourceChannel> {
        self.state.lock().channels.get(id).cloned()
    }

    /// §4.4: attaches a freshly constructed channel to the registry and
    /// subscriber map, or rejects it per the ordered checklist.
    async fn initialize_channel(
        self: &Arc<Self>,
        channel_id: ChannelId,
        source: Source,
        parent: Option<SourceChannel>,
    ) {
        {
            let mut state = self.state.lock();
            if let Some(max) = self.config.max_channels_per_client {
                if state.channels.len() >= max {
                    drop(state);
                    self.sink.send(SourceMessage::close(
                        vec![channel_id.clone()],
                        CloseReason::from(reasons::CHANNELS_LIMIT),
                    ));
                    return;
                }
            }
            if state.channels.contains(&channel_id) {
                if let Some(prior) = state.channels.remove(&channel_id) {
                    self.unsubscribe_and_maybe_detach(&mut state, &prior);
                    prior.close(CloseReason::from(reasons::CHANNEL_ID_CONFLICT));
                }
                // Both the prior channel and the rejected newcomer share
                // `channel_id` on the wire, so one CLOSE covers both
                // (§8 channel-id-conflict scenario).
                self.sink.send(SourceMessage::close(
                    vec![channel_id.clone()],
                    CloseReason::from(reasons::CHANNEL_ID_CONFLICT),
                ));
                return;
            }
        }

        if source.is_disposed() {
            let reason = source
                .dispose_reason()
                .unwrap_or_else(|| CloseReason::from("source disposed"));
            self.sink.send(SourceMessage::close(vec![channel_id], reason));
            return;
        }

        let emit_sink: std::sync::Weak<dyn EmitSink> = Arc::downgrade(self);
        let channel = SourceChannel::with_emit_sink(
            channel_id.clone(),
            source.clone(),
            self.config.context.clone(),
            emit_sink,
        );

        {
            let mut state = self.state.lock();
            let source_id = source.id();
            state.sources_by_id.insert(source_id, source.clone());
            let created_entry = state.subscribers.subscribe(source_id, channel_id.clone());
            if created_entry {
                let listeners = self.attach_inner_listeners(&source);
                state.inner_listeners.insert(source_id, listeners);
            }
            state.channels.insert(channel_id.clone(), channel.clone());
        }

        if let Some(hook) = &self.config.on_create_channel {
            hook(&channel, parent.as_ref());
        }

        self.sink.send(SourceMessage::State {
            ids: vec![channel_id],
            value: source.state(),
        });
        channel.mark_ready();
    }

    fn attach_inner_listeners(self: &Arc<Self>, source: &Source) -> InnerListeners {
        let source_id = source.id();

        let this = self.clone();
        let message = source.on_message(move |(path, args)| {
            this.fan_out_event(source_id, path.clone(), args.clone());
        });

        let this = self.clone();
        let state = source.on_state(move |value| {
            this.fan_out_state(source_id, value.clone());
        });

        let this = self.clone();
        let dispose = source.on_dispose(move |reason| {
            this.fan_out_dispose(source_id, reason.clone());
        });

        InnerListeners { message, state, dispose }
    }

    fn fan_out_event(&self, source_id: SourceId, path: EventPath, args: Vec<Value>) {
        let ids = {
            let state = self.state.lock();
            state.subscribers.get(&source_id).map(|ids| ids.to_vec())
        };
        if let Some(ids) = ids {
            if !ids.is_empty() {
                self.sink.send(SourceMessage::Event { ids, path, args });
            }
        }
    }

    fn fan_out_state(&self, source_id: SourceId, value: Value) {
        let ids = {
            let state = self.state.lock();
            state.subscribers.get(&source_id).map(|ids| ids.to_vec())
        };
        if let Some(ids) = ids {
            if !ids.is_empty() {
                self.sink.send(SourceMessage::State { ids, value });
            }
        }
    }

    fn fan_out_dispose(&self, source_id: SourceId, reason: CloseReason) {
        let ids = {
            let mut state = self.state.lock();
            let ids = state.subscribers.take(&source_id).unwrap_or_default();
            state.inner_listeners.remove(&source_id);
            state.sources_by_id.remove(&source_id);
            for id in &ids {
                if let Some(channel) = state.channels.remove(id) {
                    channel.close(reason.clone());
                }
            }
            ids
        };
        if !ids.is_empty() {
            self.sink.send(SourceMessage::close(ids, reason));
        }
    }

    /// Removes `channel`'s id from the subscriber map and, if that empties
    /// the entry, detaches its Source's inner listeners.
    fn unsubscribe_and_maybe_detach(&self, state: &mut LinkState, channel: &SourceChannel) {
        let source_id = channel.source().id();
        match state.subscribers.unsubscribe(&source_id, channel.channel_id()) {
            UnsubscribeOutcome::EntryEmptied => {
                if let Some(listeners) = state.inner_listeners.remove(&source_id) {
                    let source = state.sources_by_id.remove(&source_id);
                    if let Some(source) = source {
                        source.off_message(listeners.message);
                        source.off_state(listeners.state);
                        source.off_dispose(listeners.dispose);
                    }
                }
            }
            UnsubscribeOutcome::StillSubscribed | UnsubscribeOutcome::NotFound => {}
        }
    }

    /// Closes one channel administratively (not in response to a peer
    /// `CLOSE`): unwinds subscriber-map/registry bookkeeping, fires the
    /// channel's local `close`, disposes its Source if `autoDispose`,
    /// and notifies the peer (§4.2). Idempotent.
    pub fn close_channel(&self, channel_id: &ChannelId, reason: CloseReason) {
        let channel = {
            let mut state = self.state.lock();
            let channel = state.channels.remove(channel_id);
            if let Some(channel) = &channel {
                self.unsubscribe_and_maybe_detach(&mut state, channel);
            }
            channel
        };
        let Some(channel) = channel else { return };
        if !channel.close(reason.clone()) {
            return;
        }
        self.sink.send(SourceMessage::close(vec![channel_id.clone()], reason.clone()));
        if channel.auto_dispose() {
            channel.source().dispose(reason);
        }
    }

    /// Closes every live channel on this link with `reason` (link
    /// closure, §4.3/§4.5).
    pub fn close_all(&self, reason: CloseReason) {
        let ids: Vec<ChannelId> = {
            let state = self.state.lock();
            state.channels.ids().cloned().collect()
        };
        for id in ids {
            self.close_channel(&id, reason.clone());
        }
    }

    async fn handle_call(&self, channel_id: ChannelId, response_key: ResponseKey, path: EventPath, args: Vec<Value>) {
        let Some(channel) = self.find_channel(&channel_id) else {
            self.sink.send(SourceMessage::close(vec![channel_id.clone()], CloseReason::from(reasons::WRONG_CHANNEL)));
            return;
        };

        let outcome = self.invoke(&channel, path, args, false).await;
        if channel.is_closed() {
            return;
        }
        match outcome {
            Ok(HandlerResult::Value(value)) => {
                self.sink.send(SourceMessage::ResponseOk {
                    ids: vec![channel_id],
                    response_key,
                    value,
                });
            }
            Ok(HandlerResult::Source(_)) => {
                self.sink.send(SourceMessage::ResponseError {
                    ids: vec![channel_id],
                    response_key,
                    error: Value::Str(reasons::WRONG_DATA_TYPE.to_string()),
                });
            }
            Err(error) => {
                self.sink.send(SourceMessage::ResponseError {
                    ids: vec![channel_id],
                    response_key,
                    error,
                });
            }
        }
    }

    async fn handle_notify(&self, channel_id: ChannelId, path: EventPath, args: Vec<Value>) {
        let Some(channel) = self.find_channel(&channel_id) else {
            self.sink.send(SourceMessage::close(vec![channel_id], CloseReason::from(reasons::WRONG_CHANNEL)));
            return;
        };
        let _ = self.invoke(&channel, path, args, false).await;
    }

    fn handle_peer_close(&self, channel_id: ChannelId, reason: CloseReason) {
        let channel = {
            let mut state = self.state.lock();
            let channel = state.channels.remove(&channel_id);
            if let Some(channel) = &channel {
                self.unsubscribe_and_maybe_detach(&mut state, channel);
            }
            channel
        };
        if let Some(channel) = channel {
            channel.close(reason.clone());
            if channel.auto_dispose() {
                channel.source().dispose(reason);
            }
        }
    }

    async fn handle_create(
        self: &Arc<Self>,
        channel_id: ChannelId,
        new_channel_id: ChannelId,
        path: EventPath,
        args: Vec<Value>,
    ) {
        let Some(channel) = self.find_channel(&channel_id) else {
            self.sink.send(SourceMessage::close(vec![channel_id.clone()], CloseReason::from(reasons::WRONG_CHANNEL)));
            self.sink.send(SourceMessage::close(vec![new_channel_id], CloseReason::from(reasons::WRONG_CHANNEL)));
            return;
        };

        let node = match walk(channel.source().handler(), &path) {
            Ok(node) => node,
            Err(err) => {
                self.sink.send(SourceMessage::close(vec![new_channel_id], CloseReason::from(err.to_string())));
                return;
            }
        };
        let target = match classify(node, true, args.len()) {
            Ok(target) => target,
            Err(err) => {
                self.sink.send(SourceMessage::close(vec![new_channel_id], CloseReason::from(err.to_string())));
                return;
            }
        };

        let ctx = MethodContext {
            channel: channel.clone(),
            context: self.config.context.clone(),
        };

        match target {
            ResolvedTarget::ExistingSource(source) => {
                self.initialize_channel(new_channel_id, source, Some(channel)).await;
            }
            ResolvedTarget::PendingSource(f) => match f().await {
                Ok(source) => self.initialize_channel(new_channel_id, source, Some(channel)).await,
                Err(failure) => {
                    self.sink.send(SourceMessage::close(vec![new_channel_id], value_to_reason(failure.0)));
                }
            },
            ResolvedTarget::Constructor(ctor) => match ctor(ctx, args).await {
                Ok(source) => {
                    self.initialize_channel(new_channel_id.clone(), source, Some(channel)).await;
                    if let Some(new_channel) = self.find_channel(&new_channel_id) {
                        new_channel.set_auto_dispose(true);
                    }
                }
                Err(failure) => {
                    self.sink.send(SourceMessage::close(vec![new_channel_id], value_to_reason(failure.0)));
                }
            },
            ResolvedTarget::Method(m) => match m(ctx, args).await {
                Ok(HandlerResult::Source(source)) => {
                    self.initialize_channel(new_channel_id, source, Some(channel)).await;
                }
                Ok(HandlerResult::Value(_)) => {
                    self.sink.send(SourceMessage::close(
                        vec![new_channel_id],
                        CloseReason::from(reasons::WRONG_DATA_TYPE),
                    ));
                }
                Err(failure) => {
                    self.sink.send(SourceMessage::close(vec![new_channel_id], value_to_reason(failure.0)));
                }
            },
        }
    }

    /// Resolves `path` against `channel`'s handler and, for `CALL`/
    /// `NOTIFY` (`is_new = false`), invokes the method it names. Errors
    /// are already wire-ready `Value`s: path/data-type violations render
    /// as `"wrong path: ..."` text (§7), user failures carry their own
    /// payload through unchanged.
    async fn invoke(
        &self,
        channel: &SourceChannel,
        path: EventPath,
        args: Vec<Value>,
        is_new: bool,
    ) -> Result<HandlerResult, Value> {
        let node = walk(channel.source().handler(), &path).map_err(|e| Value::Str(e.to_string()))?;
        let target = classify(node, is_new, args.len()).map_err(|e| Value::Str(e.to_string()))?;
        let ctx = MethodContext {
            channel: channel.clone(),
            context: channel.context().clone(),
        };
        match target {
            ResolvedTarget::Method(m) => m(ctx, args).await.map_err(|failure| failure.0),
            _ => Err(Value::Str(reasons::WRONG_DATA_TYPE.to_string())),
        }
    }
}

/// Lets a `SourceChannel` write an `EVENT` addressed to only itself (§4.2
/// "single-recipient emit") without needing to know anything about the
/// registry or wire shape — it just names its own id.
impl<S: OutboundSink + 'static> EmitSink for SourceEndpoint<S> {
    fn emit_to(&self, channel_id: &ChannelId, path: EventPath, args: Vec<Value>) {
        if !self.state.lock().channels.contains(channel_id) {
            return;
        }
        self.sink.send(SourceMessage::Event {
            ids: vec![channel_id.clone()],
            path,
            args,
        });
    }
}

fn value_to_reason(value: Value) -> CloseReason {
    match value {
        Value::Str(s) => CloseReason::from(s),
        other => CloseReason::from(format!("{other:?}")),
    }
}
