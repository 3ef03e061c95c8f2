#![forbid(unsafe_op_in_unsafe_fn)]
//! Generic, semantics-free bookkeeping shared by both FluxLink endpoints:
//! an id-keyed channel registry and an owner-keyed subscriber list. Neither
//! type knows anything about `Source`, `SourceChannel` or the wire
//! protocol — that knowledge lives in `fluxlink-core`/`fluxlink`.

mod channel_registry;
mod subscriber_map;

pub use channel_registry::ChannelRegistry;
pub use subscriber_map::{SubscriberMap, UnsubscribeOutcome};
