#![forbid(unsafe_op_in_unsafe_fn)]
//! FluxLink: stateful, transport-agnostic RPC multiplexing over one
//! ordered bidirectional message link (§2).
//!
//! This crate is the top-level facade: it wires `fluxlink-core`'s
//! Source-side engine and this crate's Channel-side driver to a concrete
//! `Transport`, and re-exports the types application code needs.
//!
//! - Hosting a Source: build a `fluxlink_core::Source` (methods via
//!   `HandlerTreeBuilder`/`DefaultHandlerBuilder`, or a hand-written
//!   handler), then drive a `fluxlink_core::SourceEndpoint` over a
//!   `Transport`.
//! - Connecting as a Channel: `ChannelEndpoint::connect(transport,
//!   config)` returns the root `Channel`; `channel.call(...)`,
//!   `channel.notify(...)`, `channel.create(...)` talk to it.

mod channel;
mod channel_endpoint;
mod error;
mod source_link;
pub mod transport;

pub use channel::{Channel, StateChange};
pub use channel_endpoint::{ChannelEndpoint, ChannelEndpointConfig};
pub use error::RpcError;
pub use source_link::{spawn_source_link, QueueSink};
pub use transport::{MemTransport, Transport};

// Re-export the engine crates so a host only needs to depend on
// `fluxlink` for the common path.
pub use fluxlink_core::{
    classify, walk, ConstructFuture, ConstructorFn, Context, DefaultHandlerBuilder, EventHub,
    HandlerError, HandlerFailure, HandlerFuture, HandlerNode, HandlerResult, HandlerTreeBuilder,
    ListenerId, MessageArgs, MethodContext, MethodFn, OutboundSink, ResolvedTarget, Source,
    SourceChannel, SourceEndpoint, SourceEndpointConfig, SourceId, FORBIDDEN_SEGMENTS,
};
pub use fluxlink_protocol::{
    args_to_value, reasons, ChannelId, ClientAction, ClientMessage, CloseReason, EventPath,
    PathSegment, ProtocolError, ResponseKey, SourceAction, SourceMessage, TransportError, Value,
    BUILTIN_EVENT_NAMES,
};
pub use fluxlink_registry::{ChannelRegistry, SubscriberMap, UnsubscribeOutcome};

/// Convenience imports for application code driving either endpoint.
///
/// ```ignore
/// use fluxlink::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Channel, ChannelEndpoint, ChannelEndpointConfig, CloseReason, Context, DefaultHandlerBuilder,
        EventPath, HandlerTreeBuilder, MethodContext, RpcError, Source, SourceEndpoint,
        SourceEndpointConfig, Transport, Value,
    };
}
