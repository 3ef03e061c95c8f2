#![forbid(unsafe_op_in_unsafe_fn)]
//! Wire message shapes, action codes and the dynamic `Value` type shared
//! by both FluxLink endpoints.
//!
//! Nothing in this crate touches bytes or I/O: serialization of these
//! shapes onto a concrete wire format is left to a `Transport`
//! implementation (see `fluxlink::transport`), per the protocol's
//! transport-agnostic design (spec §1, §6.2).

mod error;
mod ids;
mod message;
mod path;
mod value;

pub use error::{reasons, CloseReason, ProtocolError, TransportError};
pub use ids::{ChannelId, ResponseKey};
pub use message::{ClientAction, ClientMessage, SourceAction, SourceMessage};
pub use path::{args_to_value, EventPath, PathSegment, BUILTIN_EVENT_NAMES};
pub use value::Value;
