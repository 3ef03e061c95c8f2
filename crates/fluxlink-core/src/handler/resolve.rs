//! Path resolution over a `HandlerNode` tree (§4.7) and the
//! `(isNewChannel, result)` branch that decides what kind of invocation a
//! resolved node supports.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use fluxlink_protocol::{EventPath, PathSegment};

use super::node::{ConstructFuture, ConstructorFn, HandlerNode, MethodFn};

/// Segments that could reach prototype internals in the original
/// reflection-based walk; rejected outright regardless of where they
/// appear (§4.7).
pub const FORBIDDEN_SEGMENTS: [&str; 3] = ["__proto__", "constructor", "prototype"];

pub fn is_forbidden_segment(segment: &str) -> bool {
    FORBIDDEN_SEGMENTS.contains(&segment)
}

/// A path-access or data-type violation surfaced while resolving or
/// classifying a handler path. Both variants render through `Display` as
/// `"wrong path: ..."` / `"wrong data type"`, matching §7's
/// `RESPONSE_ERROR`/`CLOSE` text.
#[derive(Debug, Clone)]
pub enum HandlerError {
    WrongPath {
        segment: String,
        detail: &'static str,
    },
    WrongDataType,
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::WrongPath { segment, detail } => {
                write!(f, "wrong path: {segment} ({detail})")
            }
            HandlerError::WrongDataType => write!(f, "wrong data type"),
        }
    }
}

impl Error for HandlerError {}

fn segment_text(segment: &PathSegment) -> String {
    match segment {
        PathSegment::Str(s) => s.clone(),
        PathSegment::Num(n) => n.to_string(),
    }
}

/// Walks `root` following `path`'s segments, in order. Returns the
/// terminal node. Any prefix configured on the handler builder is
/// already folded into `root` (see `DefaultHandlerBuilder::build`).
pub fn walk<'a>(root: &'a HandlerNode, path: &EventPath) -> Result<&'a HandlerNode, HandlerError> {
    let full: Vec<String> = path.segments().iter().map(segment_text).collect();

    let mut current = root;
    for segment in &full {
        if is_forbidden_segment(segment) {
            return Err(HandlerError::WrongPath {
                segment: segment.clone(),
                detail: "forbidden step",
            });
        }
        // On the very first iteration we step out of `root`, which must
        // itself already be a Record for any path to make sense. Every
        // later iteration re-checks the node we just stepped into.
        let HandlerNode::Record(map) = current else {
            return Err(HandlerError::WrongPath {
                segment: segment.clone(),
                detail: "not object",
            });
        };
        let Some(next) = map.get(segment) else {
            return Err(HandlerError::WrongPath {
                segment: segment.clone(),
                detail: "not found",
            });
        };
        current = next;
    }
    Ok(current)
}

/// What a resolved node can be turned into, once we know whether the
/// caller issued `CREATE` (`is_new_channel = true`) or `CALL`/`NOTIFY`.
pub enum ResolvedTarget {
    /// `CREATE` against an already-live Source: open the new channel
    /// bound to it directly.
    ExistingSource(crate::source::Source),
    /// `CREATE` against a thenable resolving to a Source.
    PendingSource(Arc<dyn Fn() -> ConstructFuture + Send + Sync>),
    /// `CREATE` against a constructor: build a new Source from `args`.
    Constructor(ConstructorFn),
    /// `CALL`/`NOTIFY`, or `CREATE` against a plain function: invoke it.
    Method(MethodFn),
}

/// Applies §4.7's `(isNewChannel, result)` branch to a resolved node.
pub fn classify(
    node: &HandlerNode,
    is_new_channel: bool,
    arg_count: usize,
) -> Result<ResolvedTarget, HandlerError> {
    match node {
        HandlerNode::SourceRef(source) => {
            if is_new_channel && arg_count == 0 {
                Ok(ResolvedTarget::ExistingSource(source.clone()))
            } else {
                Err(HandlerError::WrongDataType)
            }
        }
        HandlerNode::SourcePromise(f) => {
            if is_new_channel && arg_count == 0 {
                Ok(ResolvedTarget::PendingSource(f.clone()))
            } else {
                Err(HandlerError::WrongDataType)
            }
        }
        HandlerNode::Constructor(c) => {
            if is_new_channel {
                Ok(ResolvedTarget::Constructor(c.clone()))
            } else {
                Err(HandlerError::WrongDataType)
            }
        }
        HandlerNode::Method(m) => Ok(ResolvedTarget::Method(m.clone())),
        HandlerNode::Record(_) => Err(HandlerError::WrongDataType),
    }
}
