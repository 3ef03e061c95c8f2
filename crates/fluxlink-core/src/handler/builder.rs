//! Ergonomic construction of a `HandlerNode::Record` tree, plus the
//! optional string prefix described in §4.7.

use std::collections::HashMap;
use std::future::Future;

use fluxlink_protocol::Value;

use super::node::{
    ConstructFuture, ConstructorFn, HandlerFailure, HandlerFuture, HandlerNode, HandlerResult,
    MethodContext, MethodFn,
};
use super::resolve::{is_forbidden_segment, HandlerError};
use crate::source::Source;

/// Builds a `HandlerNode::Record` tree method-by-method, the statically
/// typed equivalent of handing the original an object literal of methods.
#[derive(Default)]
pub struct HandlerTreeBuilder {
    root: HashMap<String, HandlerNode>,
}

impl HandlerTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plain method at dotted `path` (e.g. `"math.sum"`).
    /// Intermediate segments are created as `Record` nodes on demand.
    pub fn method<F, Fut>(mut self, path: &str, f: F) -> Self
    where
        F: Fn(MethodContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerResult, HandlerFailure>> + Send + 'static,
    {
        let wrapped: MethodFn = std::sync::Arc::new(move |ctx, args| -> HandlerFuture {
            Box::pin(f(ctx, args))
        });
        self.insert(path, HandlerNode::Method(wrapped));
        self
    }

    /// Registers a constructor at dotted `path`, invocable only via
    /// `CREATE`.
    pub fn constructor<F, Fut>(mut self, path: &str, f: F) -> Self
    where
        F: Fn(MethodContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Source, HandlerFailure>> + Send + 'static,
    {
        let wrapped: ConstructorFn = std::sync::Arc::new(move |ctx, args| -> ConstructFuture {
            Box::pin(f(ctx, args))
        });
        self.insert(path, HandlerNode::Constructor(wrapped));
        self
    }

    /// Registers a Source directly reachable at dotted `path`.
    pub fn source(mut self, path: &str, source: Source) -> Self {
        self.insert(path, HandlerNode::SourceRef(source));
        self
    }

    fn insert(&mut self, path: &str, node: HandlerNode) {
        let segments: Vec<&str> = path.split('.').collect();
        insert_into(&mut self.root, &segments, node);
    }

    pub fn build(self) -> HandlerNode {
        HandlerNode::Record(self.root)
    }
}

fn insert_into(map: &mut HashMap<String, HandlerNode>, segments: &[&str], node: HandlerNode) {
    match segments {
        [] => unreachable!("method()/constructor() reject empty paths at call time"),
        [last] => {
            map.insert((*last).to_string(), node);
        }
        [first, rest @ ..] => {
            let entry = map
                .entry((*first).to_string())
                .or_insert_with(|| HandlerNode::Record(HashMap::new()));
            match entry {
                HandlerNode::Record(child) => insert_into(child, rest, node),
                _ => panic!("path segment {first:?} already registered as a non-record node"),
            }
        }
    }
}

/// Builds the default handler used by a Source (§4.7): an optional
/// string prefix, concatenated onto every path before lookup, plus the
/// method tree it wraps.
///
/// The prefix is folded into the tree once, at build time (`["a", "b"]`
/// wraps `root` as `{a: {b: root}}`), so path resolution itself never
/// needs to know a prefix was configured.
pub struct DefaultHandlerBuilder {
    prefix: Vec<String>,
    root: HandlerNode,
}

impl DefaultHandlerBuilder {
    /// `prefix` is dot-separated, e.g. `"api.v1"`; pass `""` for none.
    /// Rejects a prefix whose first segment is forbidden (§4.7: "a prefix
    /// that begins any of those is also rejected at builder time").
    pub fn new(prefix: &str, root: HandlerNode) -> Result<Self, HandlerError> {
        let prefix: Vec<String> = if prefix.is_empty() {
            Vec::new()
        } else {
            prefix.split('.').map(str::to_string).collect()
        };
        if let Some(first) = prefix.first() {
            if is_forbidden_segment(first) {
                return Err(HandlerError::WrongPath {
                    segment: first.clone(),
                    detail: "forbidden step",
                });
            }
        }
        Ok(Self { prefix, root })
    }

    pub fn build(self) -> HandlerNode {
        let mut node = self.root;
        for segment in self.prefix.into_iter().rev() {
            let mut wrapper = HashMap::new();
            wrapper.insert(segment, node);
            node = HandlerNode::Record(wrapper);
        }
        node
    }
}
