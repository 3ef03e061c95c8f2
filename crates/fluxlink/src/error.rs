//! Errors surfaced to application code driving a `Channel` (§1.1 of
//! `SPEC_FULL.md`). Hand-rolled `Display`/`std::error::Error` impls,
//! matching the teacher's error-enum style rather than reaching for
//! `thiserror`.

use std::fmt;

use fluxlink_protocol::{CloseReason, Value};

/// What a pending `call()` rejects with: either the remote handler raised
/// an error (`RESPONSE_ERROR`, §6.1), or the channel closed before/while
/// the call was outstanding (§3 "Pending Call" ownership, §8 "every
/// pending call is eventually settled").
#[derive(Clone, Debug, PartialEq)]
pub enum RpcError {
    /// The Source's handler raised this value as a `RESPONSE_ERROR`
    /// payload.
    Remote(Value),
    /// The channel closed (locally, by the peer, or by link shutdown)
    /// before a response arrived.
    Closed(CloseReason),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Remote(value) => write!(f, "remote error: {value:?}"),
            RpcError::Closed(reason) => write!(f, "channel closed: {reason}"),
        }
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    pub fn closed(reason: impl Into<CloseReason>) -> Self {
        RpcError::Closed(reason.into())
    }
}
