//! The explicit recursive variant §4.7/§9 calls for in place of dynamic
//! reflection: `HandlerNode` is the statically-typed equivalent of walking
//! an object graph with `in`/`typeof`.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use fluxlink_protocol::Value;

use crate::source::Source;
use crate::source_channel::SourceChannel;

/// Opaque per-link data threaded through every handler invocation (§6.3
/// "context"). Application code downcasts it to whatever type it attached
/// at endpoint-construction time.
pub type Context = Arc<dyn Any + Send + Sync>;

/// What a method or constructor invocation resolves to.
pub enum HandlerResult {
    /// A plain wire value, sent back as `RESPONSE_OK`.
    Value(Value),
    /// A Source, for handlers that hand back an object rather than a
    /// value (mirrors the original's thenable-resolving-to-a-Source
    /// case, §9).
    Source(Source),
}

impl fmt::Debug for HandlerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerResult::Value(v) => f.debug_tuple("Value").field(v).finish(),
            HandlerResult::Source(_) => f.debug_tuple("Source").field(&"..").finish(),
        }
    }
}

/// Failure surfaced by a user method/constructor body. Carries a wire
/// `Value` so it can be forwarded verbatim as a `RESPONSE_ERROR` payload.
#[derive(Debug, Clone)]
pub struct HandlerFailure(pub Value);

impl From<&str> for HandlerFailure {
    fn from(s: &str) -> Self {
        HandlerFailure(Value::Str(s.to_string()))
    }
}

impl From<String> for HandlerFailure {
    fn from(s: String) -> Self {
        HandlerFailure(Value::Str(s))
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<HandlerResult, HandlerFailure>> + Send>>;
pub type ConstructFuture = Pin<Box<dyn Future<Output = Result<Source, HandlerFailure>> + Send>>;

/// Ambient access a method/constructor body gets to the channel that
/// invoked it, in place of a captured `this` (§9 "`this`-capture via
/// proxy").
#[derive(Clone)]
pub struct MethodContext {
    /// The Source Channel this invocation arrived through. Read-only
    /// access to `channel.source()` is how a method body reaches the
    /// Source it is a method of (the closest Rust has to a bound `this`).
    pub channel: SourceChannel,
    pub context: Context,
}

impl MethodContext {
    pub fn channel_id(&self) -> &fluxlink_protocol::ChannelId {
        self.channel.channel_id()
    }
}

/// A bound callable that produces a plain value or a Source.
pub type MethodFn = Arc<dyn Fn(MethodContext, Vec<Value>) -> HandlerFuture + Send + Sync>;

/// A bound callable that produces a freshly constructed Source.
pub type ConstructorFn = Arc<dyn Fn(MethodContext, Vec<Value>) -> ConstructFuture + Send + Sync>;

/// A node in the default handler's object tree (§4.7).
#[derive(Clone)]
pub enum HandlerNode {
    /// An object whose own enumerable keys are further nodes.
    Record(HashMap<String, HandlerNode>),
    /// An invocable method.
    Method(MethodFn),
    /// A constructor function: called only under `CREATE`.
    Constructor(ConstructorFn),
    /// A Source value reachable directly (zero-arg `CREATE` target).
    SourceRef(Source),
    /// A thenable resolving to a Source (zero-arg `CREATE` target).
    SourcePromise(Arc<dyn Fn() -> ConstructFuture + Send + Sync>),
}

impl fmt::Debug for HandlerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerNode::Record(map) => f.debug_tuple("Record").field(&map.keys().collect::<Vec<_>>()).finish(),
            HandlerNode::Method(_) => f.write_str("Method(..)"),
            HandlerNode::Constructor(_) => f.write_str("Constructor(..)"),
            HandlerNode::SourceRef(_) => f.write_str("SourceRef(..)"),
            HandlerNode::SourcePromise(_) => f.write_str("SourcePromise(..)"),
        }
    }
}
