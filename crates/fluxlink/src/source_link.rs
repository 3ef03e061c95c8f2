//! Wires a transport-agnostic `SourceEndpoint` to a concrete `Transport`
//! (§4.3): a background reader task feeds inbound `ClientMessage`s into
//! `dispatch`, a writer task drains an outbound queue onto the
//! transport in order, and transport closure tears every channel down.
//!
//! `SourceEndpoint` itself stays free of any async runtime dependency
//! (`fluxlink-core`); this is the only place in the crate that actually
//! spawns tasks to run one.

use std::sync::Arc;

use fluxlink_core::{OutboundSink, Source, SourceEndpoint, SourceEndpointConfig};
use fluxlink_protocol::{reasons, ClientMessage, CloseReason, SourceMessage, Value};
use tokio::sync::mpsc;

use crate::transport::Transport;

/// Replaces a message that failed to send with the sentinel version §5/§7
/// calls for, so the peer is still told something went wrong instead of
/// silently missing an update. `None` for shapes with nothing to
/// substitute (`CLOSE` carries a plain string, not a `Value`).
fn sentinel_for(message: &SourceMessage) -> Option<SourceMessage> {
    match message {
        SourceMessage::ResponseOk { ids, response_key, .. }
        | SourceMessage::ResponseError { ids, response_key, .. } => Some(SourceMessage::ResponseError {
            ids: ids.clone(),
            response_key: response_key.clone(),
            error: Value::Str(reasons::PARSE_ERROR.to_string()),
        }),
        SourceMessage::State { ids, .. } => Some(SourceMessage::State {
            ids: ids.clone(),
            value: Value::Str(reasons::STATE_PARSE_ERROR.to_string()),
        }),
        SourceMessage::Event { ids, path, .. } => Some(SourceMessage::Event {
            ids: ids.clone(),
            path: path.clone(),
            args: vec![Value::Str(reasons::PARSE_ERROR.to_string())],
        }),
        SourceMessage::Close { .. } => None,
    }
}

/// The `OutboundSink` `spawn_source_link` hands to its `SourceEndpoint`:
/// pushes onto an unbounded queue drained by the writer task.
pub struct QueueSink(mpsc::UnboundedSender<SourceMessage>);

impl OutboundSink for QueueSink {
    fn send(&self, message: SourceMessage) {
        let _ = self.0.send(message);
    }
}

/// Spawns the reader/writer tasks that drive `root` over `transport` and
/// returns the running endpoint. Dropping the returned `Arc` does not
/// stop the tasks — they hold their own clone — closing the transport
/// (or letting it close) is how a host tears the link down.
pub fn spawn_source_link<T>(
    transport: T,
    root: Source,
    config: SourceEndpointConfig,
) -> Arc<SourceEndpoint<QueueSink>>
where
    T: Transport<SourceMessage, ClientMessage> + Clone + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let endpoint = Arc::new(SourceEndpoint::new(root, QueueSink(tx), config));

    let transport_for_writer = transport.clone();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let sentinel = sentinel_for(&message);
            if transport_for_writer.send(message).await.is_err() {
                tracing::debug!("source outbound send failed; retrying with sentinel");
                match sentinel {
                    Some(retry) => {
                        if transport_for_writer.send(retry).await.is_err() {
                            tracing::debug!("sentinel retry failed too; dropping message");
                        }
                    }
                    None => tracing::debug!("no sentinel for this message shape; dropping"),
                }
            }
        }
    });

    let endpoint_for_reader = endpoint.clone();
    tokio::spawn(async move {
        loop {
            match transport.recv().await {
                Ok(message) => endpoint_for_reader.dispatch(message).await,
                Err(_) => {
                    tracing::debug!("transport closed; closing every channel on this link");
                    endpoint_for_reader.close_all(CloseReason::from(reasons::LINK_CLOSED));
                    break;
                }
            }
        }
    });

    endpoint
}
