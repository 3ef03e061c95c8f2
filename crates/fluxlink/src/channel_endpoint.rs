//! `ChannelEndpoint`: the Channel side's driver (§4.5).
//!
//! Owns the channel registry for one link, decodes inbound `SourceMessage`s
//! and fans them out to the `Channel` objects they address, and serializes
//! outbound `ClientMessage`s onto the transport in the order application
//! code produced them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use fluxlink_protocol::{reasons, ChannelId, ClientMessage, CloseReason, SourceMessage};
use fluxlink_registry::ChannelRegistry;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::channel::{Channel, ChannelHub};
use crate::error::RpcError;
use crate::transport::Transport;

/// Per-link configuration for a `ChannelEndpoint` (§6.3).
#[derive(Clone)]
pub struct ChannelEndpointConfig {
    pub connection_timeout: Option<Duration>,
    pub next_channel_id: Arc<dyn Fn() -> ChannelId + Send + Sync>,
}

impl ChannelEndpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    pub fn with_id_generator(mut self, f: impl Fn() -> ChannelId + Send + Sync + 'static) -> Self {
        self.next_channel_id = Arc::new(f);
        self
    }
}

impl Default for ChannelEndpointConfig {
    fn default() -> Self {
        Self {
            connection_timeout: None,
            next_channel_id: Arc::new(random_channel_id),
        }
    }
}

/// Draws a 16-character alphanumeric id, the default generator named in
/// §6.3. Collisions are resolved by the Source endpoint's conflict check
/// (§4.4 step 3), not avoided here.
fn random_channel_id() -> ChannelId {
    use rand::Rng;
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let id: String = (0..16)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    ChannelId::from(id)
}

/// Owns the channel registry and the outbound write queue for one link.
/// Application code interacts with individual `Channel` handles; this
/// type is mostly internal plumbing, held alive by a background reader
/// task and by every `Channel` it has handed out (via a weak back-edge,
/// mirroring the Source/SourceChannel non-ownership in §3).
pub struct ChannelEndpoint<T> {
    transport: T,
    registry: Mutex<ChannelRegistry<Channel>>,
    config: ChannelEndpointConfig,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    closed: AtomicBool,
}

impl<T: Transport<ClientMessage, SourceMessage> + 'static> ChannelEndpoint<T> {
    /// Opens a new link over `transport`: mints a root channel id, sends
    /// the `Initialize` message, and spawns the reader/writer tasks that
    /// drive the rest of the link's lifetime (§4.5 steps 1-4).
    ///
    /// Returns the endpoint (kept alive by the spawned tasks; callers may
    /// drop their own handle once done opening further channels) and the
    /// root `Channel`.
    pub fn connect(transport: T, config: ChannelEndpointConfig) -> (Arc<Self>, Channel) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(Self {
            transport,
            registry: Mutex::new(ChannelRegistry::new()),
            config,
            outbound: outbound_tx,
            closed: AtomicBool::new(false),
        });

        let root_id = (endpoint.config.next_channel_id)();
        let hub: Weak<dyn ChannelHub> = Arc::downgrade(&endpoint);
        let root = Channel::new(root_id.clone(), hub);
        endpoint.registry.lock().insert(root_id.clone(), root.clone());

        endpoint.send(ClientMessage::Initialize { channel_id: root_id });

        Self::spawn_writer(endpoint.clone(), outbound_rx);
        Self::spawn_reader(endpoint.clone());
        if let Some(timeout) = endpoint.config.connection_timeout {
            Self::spawn_connection_timeout(endpoint.clone(), root.clone(), timeout);
        }

        (endpoint, root)
    }

    fn spawn_writer(endpoint: Arc<Self>, mut outbound_rx: mpsc::UnboundedReceiver<ClientMessage>) {
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if endpoint.transport.send(message).await.is_err() {
                    tracing::debug!("outbound send failed; transport closed");
                    break;
                }
            }
        });
    }

    fn spawn_reader(endpoint: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                match endpoint.transport.recv().await {
                    Ok(message) => endpoint.dispatch(message),
                    Err(_) => {
                        tracing::debug!("transport closed; closing every channel on this link");
                        endpoint.close_all(CloseReason::from(reasons::LINK_CLOSED));
                        break;
                    }
                }
            }
        });
    }

    fn spawn_connection_timeout(endpoint: Arc<Self>, root: Channel, timeout: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            // §5 "Expiry closes only the pending channel (never a ready
            // one)".
            if !root.is_ready() && !root.is_closed() {
                root.close_locally(CloseReason::from(reasons::TIMEOUT));
                endpoint.registry.lock().remove(root.channel_id());
            }
        });
    }

    /// Dispatches one decoded inbound message to every destination
    /// channel id present in this link's registry (§4.5).
    fn dispatch(&self, message: SourceMessage) {
        match message {
            SourceMessage::ResponseOk { ids, response_key, value } => {
                for id in &ids {
                    if let Some(channel) = self.find(id) {
                        channel.resolve_call(response_key, Ok(value.clone()));
                    }
                }
            }
            SourceMessage::ResponseError { ids, response_key, error } => {
                for id in &ids {
                    if let Some(channel) = self.find(id) {
                        channel.resolve_call(response_key, Err(RpcError::Remote(error.clone())));
                    }
                }
            }
            SourceMessage::Close { ids, reason } => {
                for id in &ids {
                    if let Some(channel) = self.registry.lock().remove(id) {
                        channel.close_locally(CloseReason::from(reason.clone()));
                    }
                }
            }
            SourceMessage::State { ids, value } => {
                for id in &ids {
                    if let Some(channel) = self.find(id) {
                        channel.apply_state(value.clone());
                    }
                }
            }
            SourceMessage::Event { ids, path, args } => {
                for id in &ids {
                    if let Some(channel) = self.find(id) {
                        channel.apply_event(path.clone(), args.clone());
                    }
                }
            }
        }
    }

    fn find(&self, id: &ChannelId) -> Option<Channel> {
        self.registry.lock().get(id).cloned()
    }

    /// Closes every channel on this link with `reason` and marks the
    /// link closed (§4.5 "On link closure"). Idempotent: a second call
    /// finds an empty registry and does nothing.
    pub fn close_all(&self, reason: CloseReason) {
        self.closed.store(true, Ordering::Release);
        let channels: Vec<Channel> = self.registry.lock().drain().map(|(_, c)| c).collect();
        for channel in channels {
            channel.close_locally(reason.clone());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T: Transport<ClientMessage, SourceMessage> + 'static> ChannelHub for ChannelEndpoint<T> {
    fn send(&self, message: ClientMessage) {
        let _ = self.outbound.send(message);
    }

    fn next_channel_id(&self) -> ChannelId {
        (self.config.next_channel_id)()
    }

    fn register(&self, channel: Channel) {
        self.registry.lock().insert(channel.channel_id().clone(), channel);
    }

    fn unregister(&self, channel_id: &ChannelId) {
        self.registry.lock().remove(channel_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemTransport;
    use fluxlink_protocol::{EventPath, PathSegment, Value};

    #[tokio_test_lite::test]
    async fn connect_sends_initialize_with_a_fresh_id() {
        let (client_transport, source_transport): (
            MemTransport<ClientMessage, SourceMessage>,
            MemTransport<SourceMessage, ClientMessage>,
        ) = MemTransport::pair();
        let (_endpoint, root) = ChannelEndpoint::connect(client_transport, ChannelEndpointConfig::new());
        let msg = source_transport.recv().await.unwrap();
        match msg {
            ClientMessage::Initialize { channel_id } => assert_eq!(&channel_id, root.channel_id()),
            other => panic!("expected Initialize, got {other:?}"),
        }
    }

    #[tokio_test_lite::test]
    async fn state_message_marks_root_ready() {
        let (client_transport, source_transport): (
            MemTransport<ClientMessage, SourceMessage>,
            MemTransport<SourceMessage, ClientMessage>,
        ) = MemTransport::pair();
        let (_endpoint, root) = ChannelEndpoint::connect(client_transport, ChannelEndpointConfig::new());
        let ClientMessage::Initialize { channel_id } = source_transport.recv().await.unwrap() else {
            panic!("expected Initialize");
        };
        source_transport
            .send(SourceMessage::State {
                ids: vec![channel_id],
                value: Value::Str("a".into()),
            })
            .await
            .unwrap();
        root.ready().await.unwrap();
        assert_eq!(root.state(), Some(Value::Str("a".into())));
    }

    #[tokio_test_lite::test]
    async fn connection_timeout_closes_a_never_ready_root() {
        let (client_transport, _source_transport): (
            MemTransport<ClientMessage, SourceMessage>,
            MemTransport<SourceMessage, ClientMessage>,
        ) = MemTransport::pair();
        let config = ChannelEndpointConfig::new().with_connection_timeout(Duration::from_millis(20));
        let (_endpoint, root) = ChannelEndpoint::connect(client_transport, config);
        let result = root.ready().await;
        assert_eq!(result, Err(CloseReason::from(reasons::TIMEOUT)));
    }

    #[tokio_test_lite::test]
    async fn call_resolves_on_matching_response() {
        let (client_transport, source_transport): (
            MemTransport<ClientMessage, SourceMessage>,
            MemTransport<SourceMessage, ClientMessage>,
        ) = MemTransport::pair();
        let (_endpoint, root) = ChannelEndpoint::connect(client_transport, ChannelEndpointConfig::new());
        let ClientMessage::Initialize { channel_id } = source_transport.recv().await.unwrap() else {
            panic!("expected Initialize");
        };
        source_transport
            .send(SourceMessage::State {
                ids: vec![channel_id.clone()],
                value: Value::Null,
            })
            .await
            .unwrap();
        root.ready().await.unwrap();

        let call_path = EventPath::new(vec![PathSegment::Str("sum".into())]);
        let root2 = root.clone();
        let call_task = tokio::spawn(async move { root2.call(call_path, vec![Value::Int(2), Value::Int(3)]).await });

        let ClientMessage::Call { response_key, .. } = source_transport.recv().await.unwrap() else {
            panic!("expected Call");
        };
        source_transport
            .send(SourceMessage::ResponseOk {
                ids: vec![channel_id],
                response_key,
                value: Value::Int(5),
            })
            .await
            .unwrap();

        assert_eq!(call_task.await.unwrap(), Ok(Value::Int(5)));
    }
}
