use crate::{ChannelId, EventPath, ResponseKey, Value};

/// Action codes for client (Channel) → Source messages. Fixed per §6.1.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, facet::Facet)]
pub enum ClientAction {
    Call = 0,
    Close = 1,
    Create = 2,
    Notify = 3,
}

/// Action codes for Source → client (Channel) messages. Fixed per §6.1.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, facet::Facet)]
pub enum SourceAction {
    ResponseOk = 0,
    Close = 1,
    State = 2,
    ResponseError = 3,
    Event = 4,
}

/// A decoded message sent by a Channel endpoint to a Source endpoint.
///
/// This is the "already-decoded message array" the core operates on; wire
/// serialization of this shape is out of scope (§1) and is the concern of
/// whatever `Transport` implementation a host chooses.
#[derive(Clone, Debug, PartialEq, facet::Facet)]
pub enum ClientMessage {
    /// `[channelId]` — the sole message shape of length 1.
    Initialize { channel_id: ChannelId },
    /// `[channelId, CALL, responseKey, path[], args[]]`
    Call {
        channel_id: ChannelId,
        response_key: ResponseKey,
        path: EventPath,
        args: Vec<Value>,
    },
    /// `[channelId, CLOSE, reason]`
    Close { channel_id: ChannelId, reason: String },
    /// `[channelId, CREATE, newChannelId, path[], args[]]`
    Create {
        channel_id: ChannelId,
        new_channel_id: ChannelId,
        path: EventPath,
        args: Vec<Value>,
    },
    /// `[channelId, NOTIFY, path[], args[]]`
    Notify {
        channel_id: ChannelId,
        path: EventPath,
        args: Vec<Value>,
    },
}

impl ClientMessage {
    /// The channel id every client message (including `Initialize`)
    /// addresses.
    pub fn channel_id(&self) -> &ChannelId {
        match self {
            ClientMessage::Initialize { channel_id }
            | ClientMessage::Call { channel_id, .. }
            | ClientMessage::Close { channel_id, .. }
            | ClientMessage::Create { channel_id, .. }
            | ClientMessage::Notify { channel_id, .. } => channel_id,
        }
    }
}

/// A decoded message sent by a Source endpoint to a Channel endpoint.
///
/// The first element on the wire is always the array of destination
/// channel ids (§6.1); for call responses that array has exactly one
/// element, which `ids` still models as a `Vec` for shape-uniformity with
/// the broadcast variants.
#[derive(Clone, Debug, PartialEq, facet::Facet)]
pub enum SourceMessage {
    /// `[ids[], RESPONSE_OK, responseKey, value]`
    ResponseOk {
        ids: Vec<ChannelId>,
        response_key: ResponseKey,
        value: Value,
    },
    /// `[ids[], RESPONSE_ERROR, responseKey, error]`
    ResponseError {
        ids: Vec<ChannelId>,
        response_key: ResponseKey,
        error: Value,
    },
    /// `[ids[], CLOSE, reason]`
    Close { ids: Vec<ChannelId>, reason: String },
    /// `[ids[], STATE, value]`
    State { ids: Vec<ChannelId>, value: Value },
    /// `[ids[], EVENT, path[], args[]]`
    Event {
        ids: Vec<ChannelId>,
        path: EventPath,
        args: Vec<Value>,
    },
}

impl SourceMessage {
    pub fn ids(&self) -> &[ChannelId] {
        match self {
            SourceMessage::ResponseOk { ids, .. }
            | SourceMessage::ResponseError { ids, .. }
            | SourceMessage::Close { ids, .. }
            | SourceMessage::State { ids, .. }
            | SourceMessage::Event { ids, .. } => ids,
        }
    }

    pub fn close(ids: Vec<ChannelId>, reason: impl Into<String>) -> Self {
        SourceMessage::Close {
            ids,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_channel_id_covers_every_variant() {
        let id = ChannelId::from("a");
        assert_eq!(
            ClientMessage::Initialize { channel_id: id.clone() }.channel_id(),
            &id
        );
        assert_eq!(
            ClientMessage::Close {
                channel_id: id.clone(),
                reason: "bye".into()
            }
            .channel_id(),
            &id
        );
    }

    #[test]
    fn source_message_close_helper() {
        let ids = vec![ChannelId::from("a"), ChannelId::from("b")];
        let msg = SourceMessage::close(ids.clone(), "gone");
        assert_eq!(msg.ids(), ids.as_slice());
        match msg {
            SourceMessage::Close { reason, .. } => assert_eq!(reason, "gone"),
            _ => panic!("expected Close"),
        }
    }
}
