//! The default handler (§4.7): a statically-typed tree in place of
//! reflection over a plain object, plus the path-resolution and
//! `(isNewChannel, result)` classification logic a Source endpoint needs
//! to dispatch `CALL`/`CREATE`/`NOTIFY`.

mod builder;
mod node;
mod resolve;

pub use builder::{DefaultHandlerBuilder, HandlerTreeBuilder};
pub use node::{
    ConstructFuture, ConstructorFn, Context, HandlerFailure, HandlerFuture, HandlerNode,
    HandlerResult, MethodContext, MethodFn,
};
pub use resolve::{classify, is_forbidden_segment, walk, HandlerError, ResolvedTarget, FORBIDDEN_SEGMENTS};
