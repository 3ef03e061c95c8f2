use std::borrow::Cow;
use std::fmt;

/// A close/dispose reason as carried on the wire: a plain string, not a
/// structured error (§6.1 ships reasons as bare strings in `CLOSE`
/// payloads). Cheap to construct from a `&'static str` constant or an
/// owned, dynamically formatted message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, facet::Facet)]
pub struct CloseReason(pub Cow<'static, str>);

impl CloseReason {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for CloseReason {
    fn from(s: &'static str) -> Self {
        CloseReason(Cow::Borrowed(s))
    }
}

impl From<String> for CloseReason {
    fn from(s: String) -> Self {
        CloseReason(Cow::Owned(s))
    }
}

impl From<CloseReason> for String {
    fn from(reason: CloseReason) -> Self {
        reason.0.into_owned()
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical reasons named explicitly by the spec (§4.4, §7, §8).
pub mod reasons {
    pub const CHANNEL_ID_CONFLICT: &str = "channel id conflict";
    pub const CHANNELS_LIMIT: &str = "channels limit";
    pub const WRONG_CHANNEL: &str = "wrong channel";
    pub const TIMEOUT: &str = "timeout";
    pub const LINK_CLOSED: &str = "link closed";
    pub const WRONG_DATA_TYPE: &str = "wrong data type";
    pub const PARSE_ERROR: &str = "parse error";
    pub const STATE_PARSE_ERROR: &str = "state parse error";
}

/// Malformed-message errors: the decoded message array didn't match any
/// recognized shape (§6.1). A `Transport` implementation that decodes
/// bytes itself is expected to surface these; the core's own dispatch
/// loops never construct one because they only ever see already-decoded
/// `ClientMessage`/`SourceMessage` values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// The message array was too short to carry a valid shape.
    TooShort { len: usize },
    /// The action code byte did not match any known action.
    UnknownAction { action: u8 },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::TooShort { len } => {
                write!(f, "message too short: {len} elements")
            }
            ProtocolError::UnknownAction { action } => {
                write!(f, "unknown action code: {action}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Errors surfaced by a `Transport` implementation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The link has been closed; no further messages will be delivered.
    Closed,
    /// Sending failed for a reason specific to the transport (e.g. the
    /// underlying socket dropped a write).
    Send(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "transport closed"),
            TransportError::Send(msg) => write!(f, "send failed: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_reason_display() {
        let r: CloseReason = reasons::CHANNEL_ID_CONFLICT.into();
        assert_eq!(r.to_string(), "channel id conflict");
    }

    #[test]
    fn protocol_error_display() {
        assert_eq!(
            ProtocolError::TooShort { len: 2 }.to_string(),
            "message too short: 2 elements"
        );
        assert_eq!(
            ProtocolError::UnknownAction { action: 9 }.to_string(),
            "unknown action code: 9"
        );
    }
}
