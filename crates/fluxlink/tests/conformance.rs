//! End-to-end coverage of the eight boundary scenarios a Source/Channel
//! link is expected to get right: an echoed call, state shared across two
//! channels bound to the same Source, opening and closing a nested
//! channel, dispose propagating to every subscriber, a channel id
//! collision, a forbidden path segment, a connection timeout, and
//! auto-dispose on a constructed channel.
//!
//! Scenarios that only exercise one endpoint's bookkeeping (id conflict,
//! path safety) drive a `SourceEndpoint` directly against a collecting
//! sink; the rest run the full link over a `MemTransport` pair.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use fluxlink::*;

struct Fixture {
    root: Source,
    inner: Source,
    widget_slot: Arc<Mutex<Option<Source>>>,
}

fn empty_record() -> HandlerNode {
    HandlerNode::Record(Default::default())
}

fn build_fixture() -> Fixture {
    let inner_handler = HandlerTreeBuilder::new()
        .method("ping", |ctx, mut args| async move {
            let payload = if args.is_empty() { Value::Null } else { args.remove(0) };
            ctx.channel.emit(path1("pong"), vec![payload]);
            Ok(HandlerResult::Value(Value::Null))
        })
        .build();
    let inner = Source::new(inner_handler, Value::Str("inner-initial".into()));
    let widget_slot: Arc<Mutex<Option<Source>>> = Arc::new(Mutex::new(None));
    let widget_slot_for_ctor = widget_slot.clone();
    let inner_for_tree = inner.clone();

    let handler = HandlerTreeBuilder::new()
        .method("sum", |_ctx, args| async move {
            match (args.first().cloned(), args.get(1).cloned()) {
                (Some(Value::Int(a)), Some(Value::Int(b))) => Ok(HandlerResult::Value(Value::Int(a + b))),
                _ => Err(HandlerFailure::from("sum expects two ints")),
            }
        })
        .method("setState", |ctx, mut args| async move {
            let value = if args.is_empty() { Value::Null } else { args.remove(0) };
            ctx.channel.source().set_state(value);
            Ok(HandlerResult::Value(Value::Null))
        })
        .source("inner", inner_for_tree)
        .constructor("widget", move |_ctx, mut args| {
            let widget_slot = widget_slot_for_ctor.clone();
            async move {
                let initial = if args.is_empty() { Value::Null } else { args.remove(0) };
                let widget = Source::new(empty_record(), initial);
                *widget_slot.lock() = Some(widget.clone());
                Ok(widget)
            }
        })
        .build();

    let root = Source::new(handler, Value::Str("root".into()));
    Fixture { root, inner, widget_slot }
}

fn path1(name: &str) -> EventPath {
    EventPath::new(vec![PathSegment::Str(name.to_string())])
}

fn linked_pair(root: Source) -> (Arc<SourceEndpoint<QueueSink>>, Arc<ChannelEndpoint<MemTransport<ClientMessage, SourceMessage>>>, Channel) {
    let (channel_transport, source_transport): (
        MemTransport<ClientMessage, SourceMessage>,
        MemTransport<SourceMessage, ClientMessage>,
    ) = MemTransport::pair();
    let source_endpoint = spawn_source_link(source_transport, root, SourceEndpointConfig::new(Arc::new(())));
    let (channel_endpoint, root_channel) = ChannelEndpoint::connect(channel_transport, ChannelEndpointConfig::new());
    (source_endpoint, channel_endpoint, root_channel)
}

#[tokio_test_lite::test]
async fn scenario_1_echo_call_round_trips_a_value() {
    let fixture = build_fixture();
    let (_source, _channel_link, root) = linked_pair(fixture.root);
    root.ready().await.unwrap();

    let result = root.call(path1("sum"), vec![Value::Int(2), Value::Int(3)]).await;
    assert_eq!(result, Ok(Value::Int(5)));
}

#[tokio_test_lite::test]
async fn scenario_2_shared_state_across_two_channels() {
    let fixture = build_fixture();
    let (_source, _channel_link, root) = linked_pair(fixture.root);
    root.ready().await.unwrap();

    let a = root.create(path1("inner"), vec![]);
    let b = root.create(path1("inner"), vec![]);
    a.ready().await.unwrap();
    b.ready().await.unwrap();
    assert_eq!(a.state(), Some(Value::Str("inner-initial".into())));
    assert_eq!(b.state(), Some(Value::Str("inner-initial".into())));

    let (tx_a, rx_a) = tokio::sync::oneshot::channel();
    let (tx_b, rx_b) = tokio::sync::oneshot::channel();
    let tx_a = Mutex::new(Some(tx_a));
    let tx_b = Mutex::new(Some(tx_b));
    a.on_state(move |change| {
        if let Some(tx) = tx_a.lock().take() {
            let _ = tx.send(change.new.clone());
        }
    });
    b.on_state(move |change| {
        if let Some(tx) = tx_b.lock().take() {
            let _ = tx.send(change.new.clone());
        }
    });

    fixture.inner.set_state(Value::Str("shared".into()));

    assert_eq!(rx_a.await.unwrap(), Value::Str("shared".into()));
    assert_eq!(rx_b.await.unwrap(), Value::Str("shared".into()));
}

#[tokio_test_lite::test]
async fn single_recipient_emit_reaches_only_the_calling_channel() {
    let fixture = build_fixture();
    let (_source, _channel_link, root) = linked_pair(fixture.root);
    root.ready().await.unwrap();

    let a = root.create(path1("inner"), vec![]);
    let b = root.create(path1("inner"), vec![]);
    a.ready().await.unwrap();
    b.ready().await.unwrap();

    let a_pongs = Arc::new(Mutex::new(Vec::new()));
    let b_pongs = Arc::new(Mutex::new(Vec::new()));
    let a_pongs_for_listener = a_pongs.clone();
    let b_pongs_for_listener = b_pongs.clone();
    a.on(path1("pong"), move |args| a_pongs_for_listener.lock().push(args.clone()));
    b.on(path1("pong"), move |args| b_pongs_for_listener.lock().push(args.clone()));

    a.call(path1("ping"), vec![Value::Int(7)]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(a_pongs.lock().as_slice(), [vec![Value::Int(7)]]);
    assert!(b_pongs.lock().is_empty());
}

#[tokio_test_lite::test]
async fn scenario_3_nested_channel_open_and_close_does_not_affect_root() {
    let fixture = build_fixture();
    let (_source, _channel_link, root) = linked_pair(fixture.root);
    root.ready().await.unwrap();

    let nested = root.create(path1("inner"), vec![]);
    nested.ready().await.unwrap();
    assert!(nested.is_ready());

    nested.close(CloseReason::from("no longer needed"));
    assert!(nested.is_closed());

    // The root channel, bound to a different Source, is untouched.
    let result = root.call(path1("sum"), vec![Value::Int(1), Value::Int(1)]).await;
    assert_eq!(result, Ok(Value::Int(2)));
}

#[tokio_test_lite::test]
async fn scenario_4_dispose_propagates_to_every_subscriber() {
    let fixture = build_fixture();
    let (_source, _channel_link, root) = linked_pair(fixture.root);
    root.ready().await.unwrap();

    let a = root.create(path1("inner"), vec![]);
    let b = root.create(path1("inner"), vec![]);
    a.ready().await.unwrap();
    b.ready().await.unwrap();

    let (tx_a, rx_a) = tokio::sync::oneshot::channel();
    let (tx_b, rx_b) = tokio::sync::oneshot::channel();
    let tx_a = Mutex::new(Some(tx_a));
    let tx_b = Mutex::new(Some(tx_b));
    a.on_close(move |reason| {
        if let Some(tx) = tx_a.lock().take() {
            let _ = tx.send(reason.clone());
        }
    });
    b.on_close(move |reason| {
        if let Some(tx) = tx_b.lock().take() {
            let _ = tx.send(reason.clone());
        }
    });

    fixture.inner.dispose(CloseReason::from("inner retired"));

    assert_eq!(rx_a.await.unwrap(), CloseReason::from("inner retired"));
    assert_eq!(rx_b.await.unwrap(), CloseReason::from("inner retired"));
    assert!(a.is_closed());
    assert!(b.is_closed());
}

#[tokio_test_lite::test]
async fn scenario_5_channel_id_conflict_closes_both_sides_with_one_message() {
    let fixture = build_fixture();
    let log: Arc<Mutex<Vec<SourceMessage>>> = Arc::new(Mutex::new(Vec::new()));
    let log_for_sink = log.clone();
    let sink = move |message: SourceMessage| log_for_sink.lock().push(message);
    let endpoint = Arc::new(SourceEndpoint::new(fixture.root, sink, SourceEndpointConfig::new(Arc::new(()))));

    let dup_id = ChannelId::from("dup");
    endpoint.dispatch(ClientMessage::Initialize { channel_id: dup_id.clone() }).await;
    log.lock().clear();

    endpoint.dispatch(ClientMessage::Initialize { channel_id: dup_id.clone() }).await;

    let messages = log.lock().clone();
    assert_eq!(messages.len(), 1);
    match &messages[0] {
        SourceMessage::Close { ids, reason } => {
            assert_eq!(ids, &vec![dup_id]);
            assert_eq!(reason, reasons::CHANNEL_ID_CONFLICT);
        }
        other => panic!("expected a single Close, got {other:?}"),
    }
}

#[tokio_test_lite::test]
async fn scenario_6_forbidden_path_segment_is_rejected() {
    let fixture = build_fixture();
    let log: Arc<Mutex<Vec<SourceMessage>>> = Arc::new(Mutex::new(Vec::new()));
    let log_for_sink = log.clone();
    let sink = move |message: SourceMessage| log_for_sink.lock().push(message);
    let endpoint = Arc::new(SourceEndpoint::new(fixture.root, sink, SourceEndpointConfig::new(Arc::new(()))));

    let id = ChannelId::from("c1");
    endpoint.dispatch(ClientMessage::Initialize { channel_id: id.clone() }).await;
    log.lock().clear();

    endpoint
        .dispatch(ClientMessage::Call {
            channel_id: id,
            response_key: ResponseKey(1),
            path: EventPath::new(vec![PathSegment::Str("__proto__".into())]),
            args: vec![],
        })
        .await;

    let messages = log.lock().clone();
    assert_eq!(messages.len(), 1);
    match &messages[0] {
        SourceMessage::ResponseError { error, .. } => match error {
            Value::Str(text) => assert!(text.contains("forbidden step"), "unexpected error text: {text}"),
            other => panic!("expected a string error, got {other:?}"),
        },
        other => panic!("expected ResponseError, got {other:?}"),
    }
}

#[tokio_test_lite::test]
async fn scenario_7_connection_timeout_closes_a_never_ready_channel() {
    let (channel_transport, _source_transport): (
        MemTransport<ClientMessage, SourceMessage>,
        MemTransport<SourceMessage, ClientMessage>,
    ) = MemTransport::pair();
    let config = ChannelEndpointConfig::new().with_connection_timeout(Duration::from_millis(30));
    let (_endpoint, root) = ChannelEndpoint::connect(channel_transport, config);

    assert_eq!(root.ready().await, Err(CloseReason::from(reasons::TIMEOUT)));
}

#[tokio_test_lite::test]
async fn scenario_8_auto_dispose_on_constructed_channel() {
    let fixture = build_fixture();
    let widget_slot = fixture.widget_slot.clone();
    let (_source, _channel_link, root) = linked_pair(fixture.root);
    root.ready().await.unwrap();

    let widget_channel = root.create(path1("widget"), vec![Value::Str("fresh".into())]);
    widget_channel.ready().await.unwrap();
    assert_eq!(widget_channel.state(), Some(Value::Str("fresh".into())));

    let widget_source = widget_slot.lock().clone().expect("constructor ran on the Source side");
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = Mutex::new(Some(tx));
    widget_source.on_dispose(move |_reason| {
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(());
        }
    });

    widget_channel.close(CloseReason::from("done with it"));
    rx.await.unwrap();
    assert!(widget_source.is_disposed());
    assert_eq!(widget_source.dispose_reason(), Some(CloseReason::from("done with it")));
}
