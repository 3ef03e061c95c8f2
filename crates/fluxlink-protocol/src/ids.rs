use std::fmt;

/// Identifies one multiplexed channel within a single link.
///
/// Channel ids are opaque strings on the wire (the default generator draws
/// 16 random alphanumeric characters, per the channel endpoint's
/// configuration), but nothing in the protocol requires that shape: a link
/// where both peers agree may use a deterministic sequence instead.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, facet::Facet)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A per-channel, monotonically increasing call identifier minted by the
/// Channel endpoint for `CALL` messages and echoed back in the matching
/// `RESPONSE_OK`/`RESPONSE_ERROR`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, facet::Facet)]
pub struct ResponseKey(pub u64);

impl fmt::Display for ResponseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
