//! Source-side engine for FluxLink: the `Source`/`SourceChannel` objects,
//! the default handler tree, and the `SourceEndpoint` dispatch loop that
//! ties them to the wire protocol (§2 components 2-5, 7).
//!
//! Transport-free by construction — nothing here depends on an async
//! runtime or a byte format; `fluxlink` wires this engine to an actual
//! link.

mod event_hub;
mod handler;
mod source;
mod source_channel;
mod source_endpoint;

pub use event_hub::{EventHub, ListenerId};
pub use handler::{
    classify, walk, ConstructFuture, ConstructorFn, Context, DefaultHandlerBuilder, HandlerError,
    HandlerFailure, HandlerFuture, HandlerNode, HandlerResult, HandlerTreeBuilder, MethodContext,
    MethodFn, ResolvedTarget, FORBIDDEN_SEGMENTS,
};
pub use source::{MessageArgs, Source, SourceId};
pub use source_channel::SourceChannel;
pub use source_endpoint::{OutboundSink, SourceEndpoint, SourceEndpointConfig};
