use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use farwire::Frame;
use farwire::ReplyFrame;
use farwire::ReplyStatus;
use farwire::RequestFrame;

use crate::adapter::AdapterRegistry;
use crate::adapter::Current;
use crate::adapter::DispatchError;
use crate::adapter::DispatchResult;
use crate::adapter::Lookup;
use crate::adapter::OBJECT_TYPE_ID;
use crate::adapter::ObjectAdapter;
use crate::adapter::Servant;
use crate::config::Config;
use crate::config::EndpointSelection;
use crate::emitter::Deadline;
use crate::emitter::Emitter;
use crate::emitter::EmitterKey;
use crate::emitter::EmitterPool;
use crate::error::Error;
use crate::error::FailureKind;
use crate::error::TransportFailure;
use crate::memory::MemoryConnector;
use crate::memory::MemoryTransport;
use crate::payload::Invocation;
use crate::payload::Payload;
use crate::reference::Reference;
use crate::retry::RetryState;
use crate::retry::Verdict;
use crate::retry::is_retryable;
use crate::runtime::Runtime;
use crate::transport;
use crate::transport::Transport;
use farwire::Endpoint;
use farwire::Mode;

fn printer_ref() -> Reference {
    Reference::new("Printer", vec![Endpoint::tcp("localhost", 10000)]).unwrap()
}

fn failure(kind: FailureKind) -> Error {
    Error::Transport(TransportFailure::new(kind, "test"))
}

// ============================================================================
//  REFERENCES
// ============================================================================

#[test]
fn new_reference_has_documented_defaults() {
    let r = printer_ref();
    assert_eq!(r.identity(), "Printer");
    assert_eq!(r.mode(), Mode::Twoway);
    assert!(!r.secure());
    assert_eq!(r.timeout_ms(), None);
    assert!(r.collocation_allowed());
}

#[test]
fn empty_identity_is_rejected() {
    assert!(matches!(Reference::new("", vec![]), Err(Error::InvalidArgument(_))));
    assert!(matches!(printer_ref().with_identity(""), Err(Error::InvalidArgument(_))));
}

#[test]
fn each_mutator_replaces_exactly_one_field() {
    let r = printer_ref();

    let m = r.with_mode(Mode::BatchDatagram);
    assert_eq!(m.mode(), Mode::BatchDatagram);
    assert_eq!(m.with_mode(Mode::Twoway), r);

    let s = r.with_secure(true);
    assert!(s.secure());
    assert_eq!(s.with_secure(false), r);

    let t = r.with_timeout(Some(100));
    assert_eq!(t.timeout_ms(), Some(100));
    assert_eq!(t.with_timeout(None), r);

    let c = r.with_collocation(false);
    assert!(!c.collocation_allowed());
    assert_eq!(c.with_collocation(true), r);

    let i = r.with_identity("Scanner").unwrap();
    assert_eq!(i.identity(), "Scanner");
    assert_eq!(i.endpoints(), r.endpoints());
    assert_eq!(i.with_identity("Printer").unwrap(), r);

    let e = r.with_endpoints(vec![Endpoint::mem("printer")]);
    assert_eq!(e.endpoints(), [Endpoint::mem("printer")]);
    assert_eq!(e.identity(), r.identity());
    assert_eq!(e.mode(), r.mode());
}

#[test]
fn mutators_leave_the_original_untouched() {
    let r = printer_ref();
    let _ = r.with_mode(Mode::Oneway).with_secure(true).with_timeout(Some(5));
    assert_eq!(r, printer_ref());
}

#[test]
fn reference_survives_wire_conversion() {
    let r = printer_ref().with_mode(Mode::Oneway).with_timeout(Some(250));
    assert_eq!(Reference::from_wire(r.to_wire()).unwrap(), r);
}

#[test]
fn reference_display_lists_flags_and_endpoints() {
    let r = printer_ref().with_secure(true).with_timeout(Some(100));
    assert_eq!(r.to_string(), "Printer -twoway -secure -t 100 @ tcp:localhost:10000");
}

// ============================================================================
//  CONFIG
// ============================================================================

#[test]
fn config_defaults() {
    let config = Config::default();
    assert_eq!(config.max_retries(), 1);
    assert_eq!(config.retry_interval(), Duration::ZERO);
    assert_eq!(config.max_forwards(), 5);
    assert_eq!(config.connect_timeout(), None);
    assert_eq!(config.invocation_timeout(), None);
    assert_eq!(config.endpoint_selection(), EndpointSelection::Random);
    assert!(config.collocation());
}

#[test]
fn builder_overrides_only_what_it_sets() {
    let config = Config::builder()
        .max_retries(3)
        .connect_timeout(Duration::from_millis(50))
        .endpoint_selection(EndpointSelection::Ordered)
        .build();
    assert_eq!(config.max_retries(), 3);
    assert_eq!(config.connect_timeout(), Some(Duration::from_millis(50)));
    assert_eq!(config.endpoint_selection(), EndpointSelection::Ordered);
    assert_eq!(config.max_forwards(), 5);
    assert!(config.collocation());
}

// ============================================================================
//  PAYLOADS
// ============================================================================

#[test]
fn value_payload_shares_the_original_object() {
    let payload = Payload::value(vec![1u32, 2, 3]);
    let a = payload.shared::<Vec<u32>>().unwrap();
    let b = payload.clone().shared::<Vec<u32>>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(payload.shared::<String>().is_none());
}

#[test]
fn value_payload_encodes_like_an_eager_one() {
    let lazy = Payload::value(("ink".to_string(), 2u8));
    let eager = Payload::encode(&("ink".to_string(), 2u8)).unwrap();
    assert_eq!(lazy.clone().into_bytes().unwrap(), eager.clone().into_bytes().unwrap());

    let (text, n): (String, u8) = eager.decode().unwrap();
    assert_eq!((text.as_str(), n), ("ink", 2));
    let (text, n): (String, u8) = lazy.decode().unwrap();
    assert_eq!((text.as_str(), n), ("ink", 2));
}

#[test]
fn reserved_invocations_are_idempotent() {
    let is_a = Invocation::is_a("::Demo::Printer");
    assert_eq!(is_a.operation(), "_is_a");
    assert!(is_a.is_idempotent());
    assert_eq!(is_a.args().decode::<String>().unwrap(), "::Demo::Printer");

    assert!(Invocation::ping().is_idempotent());
    assert!(!Invocation::new("print", Payload::empty()).is_idempotent());
}

// ============================================================================
//  RETRY POLICY
// ============================================================================

#[test]
fn unsent_failures_are_always_retryable() {
    for kind in [
        FailureKind::ConnectFailed,
        FailureKind::ConnectTimeout,
        FailureKind::NotSent,
        FailureKind::ConnectionClosed,
    ] {
        assert!(is_retryable(&failure(kind), false), "{:?}", kind);
    }
}

#[test]
fn ambiguous_failures_need_idempotence() {
    for kind in [FailureKind::SendFailed, FailureKind::ConnectionLost] {
        assert!(!is_retryable(&failure(kind), false), "{:?}", kind);
        assert!(is_retryable(&failure(kind), true), "{:?}", kind);
    }
}

#[test]
fn fatal_errors_are_never_retried() {
    let fatal = [
        failure(FailureKind::NoEndpoint),
        failure(FailureKind::ForwardLimit),
        Error::Timeout { after: Duration::from_millis(100) },
        Error::ObjectNotFound { identity: "x".into() },
        Error::OperationNotFound { identity: "x".into(), operation: "y".into() },
        Error::Remote(Payload::empty()),
        Error::Unknown("boom".into()),
        Error::InvalidArgument("bad".into()),
        Error::Protocol(farwire::Error::Decode("short".into())),
    ];
    for error in &fatal {
        assert!(!is_retryable(error, true), "{}", error);
    }
}

#[test]
fn retry_state_allows_max_retries_then_fails() {
    let mut state = RetryState::new(&Config::builder().max_retries(2).build(), None);
    assert!(matches!(state.on_failure(failure(FailureKind::ConnectFailed), false), Verdict::Retry));
    assert!(matches!(state.on_failure(failure(FailureKind::ConnectFailed), false), Verdict::Retry));
    match state.on_failure(failure(FailureKind::NotSent), false) {
        Verdict::Fail(e) => assert_eq!(e.failure_kind(), Some(FailureKind::NotSent)),
        Verdict::Retry => panic!("third failure must surface"),
    }
    assert_eq!(state.attempts(), 2);
}

#[test]
fn forwards_do_not_consume_retries() {
    let mut state = RetryState::new(&Config::builder().max_forwards(2).build(), None);
    state.on_forward().unwrap();
    state.on_forward().unwrap();
    assert_eq!(state.attempts(), 0);
    let err = state.on_forward().unwrap_err();
    assert_eq!(err.failure_kind(), Some(FailureKind::ForwardLimit));
}

#[tokio::test(start_paused = true)]
async fn passed_deadline_stops_retries() {
    let config = Config::builder().max_retries(5).build();
    let mut state = RetryState::new(&config, Some(Duration::from_millis(100)));
    assert_eq!(state.deadline().map(|d| d.budget()), Some(Duration::from_millis(100)));
    assert!(matches!(state.on_failure(failure(FailureKind::ConnectTimeout), false), Verdict::Retry));

    tokio::time::advance(Duration::from_millis(100)).await;
    assert!(matches!(
        state.on_failure(failure(FailureKind::ConnectFailed), false),
        Verdict::Fail(e) if e.failure_kind() == Some(FailureKind::ConnectFailed)
    ));
    assert_eq!(state.attempts(), 1);
}

// ============================================================================
//  EMITTER KEYS
// ============================================================================

#[test]
fn emitter_key_filters_endpoints_by_mode_and_security() {
    let mixed = Reference::new(
        "Printer",
        vec![
            Endpoint::tcp("a", 1),
            Endpoint::ssl("b", 2),
            Endpoint::udp("c", 3),
        ],
    )
    .unwrap();

    let stream = EmitterKey::for_reference(&mixed).unwrap();
    assert_eq!(stream.endpoints(), [Endpoint::tcp("a", 1), Endpoint::ssl("b", 2)]);

    let secure = EmitterKey::for_reference(&mixed.with_secure(true)).unwrap();
    assert_eq!(secure.endpoints(), [Endpoint::ssl("b", 2)]);

    let datagram = EmitterKey::for_reference(&mixed.with_mode(Mode::Datagram)).unwrap();
    assert_eq!(datagram.endpoints(), [Endpoint::udp("c", 3)]);
}

#[test]
fn emitter_key_without_usable_endpoint_fails() {
    let err = EmitterKey::for_reference(&printer_ref().with_mode(Mode::Datagram)).unwrap_err();
    assert_eq!(err.failure_kind(), Some(FailureKind::NoEndpoint));
}

#[test]
fn oneway_and_batch_oneway_share_a_key() {
    let r = printer_ref();
    let oneway = EmitterKey::for_reference(&r.with_mode(Mode::Oneway)).unwrap();
    let batch = EmitterKey::for_reference(&r.with_mode(Mode::BatchOneway)).unwrap();
    assert_eq!(oneway, batch);
    let timed = EmitterKey::for_reference(&r.with_timeout(Some(10))).unwrap();
    assert_ne!(oneway, timed);
}

// ============================================================================
//  EMITTER
// ============================================================================

fn twoway(operation: &str) -> RequestFrame {
    RequestFrame::new("Printer", operation, Mode::Twoway, vec![])
}

async fn next_frame(server: &MemoryTransport) -> Frame {
    let bytes = server.recv().await.unwrap().expect("client hung up");
    Frame::from_bytes(&bytes).unwrap()
}

#[tokio::test]
async fn emitter_correlates_out_of_order_replies() {
    let (client, server) = MemoryTransport::pair();
    let emitter = Arc::new(Emitter::start(Endpoint::mem("t"), Arc::new(client)));

    let first = tokio::spawn({
        let emitter = Arc::clone(&emitter);
        async move { emitter.request(twoway("first"), None).await }
    });
    let Frame::Request(a) = next_frame(&server).await else { panic!() };
    let second = tokio::spawn({
        let emitter = Arc::clone(&emitter);
        async move { emitter.request(twoway("second"), None).await }
    });
    let Frame::Request(b) = next_frame(&server).await else { panic!() };
    assert_ne!(a.seq, b.seq);

    for (seq, body) in [(b.seq, b"second".to_vec()), (a.seq, b"first".to_vec())] {
        let reply = Frame::Reply(ReplyFrame { seq, status: ReplyStatus::Ok(body) });
        server.send(&reply.to_bytes().unwrap()).await.unwrap();
    }

    assert_eq!(first.await.unwrap().unwrap(), ReplyStatus::Ok(b"first".to_vec()));
    assert_eq!(second.await.unwrap().unwrap(), ReplyStatus::Ok(b"second".to_vec()));
}

#[tokio::test]
async fn close_notice_fails_pending_as_closed() {
    let (client, server) = MemoryTransport::pair();
    let emitter = Arc::new(Emitter::start(Endpoint::mem("t"), Arc::new(client)));

    let pending = tokio::spawn({
        let emitter = Arc::clone(&emitter);
        async move { emitter.request(twoway("print"), None).await }
    });
    next_frame(&server).await;
    server.send(&Frame::CloseConnection.to_bytes().unwrap()).await.unwrap();

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err.failure_kind(), Some(FailureKind::ConnectionClosed));
}

#[tokio::test]
async fn hangup_fails_pending_as_lost_and_later_calls_as_not_sent() {
    let (client, server) = MemoryTransport::pair();
    let emitter = Arc::new(Emitter::start(Endpoint::mem("t"), Arc::new(client)));

    let pending = tokio::spawn({
        let emitter = Arc::clone(&emitter);
        async move { emitter.request(twoway("print"), None).await }
    });
    next_frame(&server).await;
    drop(server);

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err.failure_kind(), Some(FailureKind::ConnectionLost));
    assert!(emitter.is_closed());

    let err = emitter.request(twoway("again"), None).await.unwrap_err();
    assert_eq!(err.failure_kind(), Some(FailureKind::NotSent));
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out() {
    let (client, _server) = MemoryTransport::pair();
    let emitter = Emitter::start(Endpoint::mem("t"), Arc::new(client));

    let err = emitter
        .request(twoway("print"), Some(Deadline::after(Duration::from_millis(100))))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { after } if after == Duration::from_millis(100)));
}

#[tokio::test]
async fn batch_is_held_until_flushed() {
    let (client, server) = MemoryTransport::pair();
    let emitter = Emitter::start(Endpoint::mem("t"), Arc::new(client));

    for op in ["a", "b", "c"] {
        emitter
            .enqueue(RequestFrame::new("Log", op, Mode::BatchOneway, vec![]))
            .await
            .unwrap();
    }
    assert_eq!(emitter.batched().await, 3);
    assert_eq!(emitter.flush_batch().await.unwrap(), 3);
    assert_eq!(emitter.flush_batch().await.unwrap(), 0);

    let Frame::Batch(requests) = next_frame(&server).await else {
        panic!("expected one batch frame");
    };
    let ops: Vec<&str> = requests.iter().map(|r| r.operation.as_str()).collect();
    assert_eq!(ops, ["a", "b", "c"]);
    assert!(requests.iter().all(|r| r.seq == 0));
}

#[tokio::test]
async fn request_frame_from_the_server_stops_the_reader() {
    let (client, server) = MemoryTransport::pair();
    let emitter = Arc::new(Emitter::start(Endpoint::mem("t"), Arc::new(client)));

    let pending = tokio::spawn({
        let emitter = Arc::clone(&emitter);
        async move { emitter.request(twoway("print"), None).await }
    });
    next_frame(&server).await;
    server.send(&Frame::Request(twoway("callback")).to_bytes().unwrap()).await.unwrap();

    let Err(Error::Transport(failure)) = pending.await.unwrap() else {
        panic!("expected a transport failure");
    };
    assert_eq!(failure.kind, FailureKind::ConnectionLost);
    assert!(failure.detail.starts_with("Protocol violation"), "{}", failure.detail);
}

/// Memory transport that counts `close` calls.
struct CountingTransport {
    inner: MemoryTransport,
    closes: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Transport for CountingTransport {
    async fn send(&self, payload: &[u8]) -> transport::Result<()> {
        self.inner.send(payload).await
    }

    async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        self.inner.recv().await
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await;
    }
}

fn counting_pair() -> (CountingTransport, MemoryTransport, Arc<AtomicUsize>) {
    let (client, server) = MemoryTransport::pair();
    let closes = Arc::new(AtomicUsize::new(0));
    (CountingTransport { inner: client, closes: Arc::clone(&closes) }, server, closes)
}

#[tokio::test]
async fn dropping_an_emitter_closes_its_transport() {
    let (client, server, closes) = counting_pair();
    let emitter = Emitter::start(Endpoint::mem("t"), Arc::new(client));
    drop(emitter);

    // the server sees the end of the stream once the client side is closed
    assert!(server.recv().await.unwrap().is_none());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reader_closes_the_transport_when_the_peer_hangs_up() {
    let (client, server, closes) = counting_pair();
    let emitter = Emitter::start(Endpoint::mem("t"), Arc::new(client));
    drop(server);

    for _ in 0..100 {
        if closes.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(emitter.is_closed());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_deadline_covers_every_endpoint() {
    let connector = MemoryConnector::new();
    let (a, b) = (Endpoint::mem("slow-a"), Endpoint::mem("slow-b"));
    connector.hang(&a, true);
    connector.hang(&b, true);
    let key = EmitterKey::for_reference(&Reference::new("Echo", vec![a.clone(), b.clone()]).unwrap()).unwrap();

    let started = tokio::time::Instant::now();
    let deadline = Some(Deadline::after(Duration::from_millis(100)));
    let err = Emitter::connect(&connector, &key, deadline, EndpointSelection::Ordered)
        .await
        .err()
        .expect("both endpoints hang");

    assert_eq!(err.failure_kind(), Some(FailureKind::ConnectTimeout));
    assert!(started.elapsed() < Duration::from_millis(150));
    assert_eq!(connector.connects(&a), 1);
    assert_eq!(connector.connects(&b), 0);
}

fn echo_network() -> MemoryConnector {
    let connector = MemoryConnector::new();
    let adapter = echo_adapter();
    adapter.activate();
    connector.serve(adapter);
    connector
}

#[tokio::test]
async fn pool_forgets_released_and_failed_keys() {
    let connector = echo_network();
    let pool = EmitterPool::new(Arc::new(connector.clone()));
    let reference = Reference::new("Echo", vec![Endpoint::mem("echo")]).unwrap();

    let mut held = Vec::new();
    for ms in 1..=5 {
        let key = EmitterKey::for_reference(&reference.with_timeout(Some(ms))).unwrap();
        held.push(pool.acquire(&key, None, EndpointSelection::Ordered).await.unwrap());
    }
    assert_eq!(pool.slots(), 5);
    assert_eq!(pool.live(), 5);

    drop(held);
    assert_eq!(pool.slots(), 0);
    assert_eq!(pool.live(), 0);

    connector.refuse(&Endpoint::mem("echo"), 1);
    let key = EmitterKey::for_reference(&reference).unwrap();
    assert!(pool.acquire(&key, None, EndpointSelection::Ordered).await.is_err());
    assert_eq!(pool.slots(), 0);
}

#[tokio::test]
async fn dropped_proxies_leave_no_pool_slots() {
    let runtime = Runtime::new(Arc::new(echo_network()));
    let reference = Reference::new("Echo", vec![Endpoint::mem("echo")]).unwrap();

    for ms in 1..=50 {
        let prx = runtime.proxy(reference.clone()).with_timeout(ms);
        prx.ping().await.unwrap();
    }
    assert_eq!(runtime.live_emitters(), 0);
    assert_eq!(runtime.pool().slots(), 0);
}

// ============================================================================
//  ADAPTER
// ============================================================================

struct Echo;

#[async_trait::async_trait]
impl Servant for Echo {
    fn type_ids(&self) -> &[&'static str] {
        &["::Demo::Echo"]
    }

    async fn dispatch(&self, current: &Current, args: Payload) -> DispatchResult {
        match current.operation.as_str() {
            "echo" => Ok(args),
            "fail" => Err(DispatchError::User(Payload::value("refused".to_string()))),
            _ => Err(DispatchError::OperationNotExist),
        }
    }
}

fn echo_adapter() -> Arc<ObjectAdapter> {
    let adapter = ObjectAdapter::new("echo", vec![Endpoint::mem("echo")]);
    adapter.add("Echo", Arc::new(Echo)).unwrap();
    adapter
}

#[tokio::test]
async fn adapter_answers_reserved_operations() {
    let adapter = echo_adapter();

    for (type_id, expected) in [("::Demo::Echo", true), (OBJECT_TYPE_ID, true), ("::Demo::Other", false)] {
        let reply = adapter
            .dispatch("Echo", "_is_a", Mode::Twoway, Payload::value(type_id.to_string()), true)
            .await
            .unwrap();
        assert_eq!(reply.decode::<bool>().unwrap(), expected, "{}", type_id);
    }

    let pong = adapter.dispatch("Echo", "_ping", Mode::Twoway, Payload::empty(), true).await;
    assert!(pong.is_ok());
}

#[tokio::test]
async fn adapter_reports_missing_objects_and_forwards() {
    let adapter = echo_adapter();
    let elsewhere = Reference::new("Echo", vec![Endpoint::mem("other")]).unwrap();
    adapter.add_forward("Moved", elsewhere.clone()).unwrap();

    let missing = adapter.dispatch("Nobody", "echo", Mode::Twoway, Payload::empty(), true).await;
    assert!(matches!(missing, Err(DispatchError::ObjectNotExist)));

    let moved = adapter.dispatch("Moved", "echo", Mode::Twoway, Payload::empty(), true).await;
    assert!(matches!(moved, Err(DispatchError::LocationForward(r)) if r == elsewhere));

    assert!(matches!(adapter.lookup("Echo"), Lookup::Servant(_)));
    assert!(adapter.add("Moved", Arc::new(Echo)).is_err());
    assert!(adapter.add("", Arc::new(Echo)).is_err());
}

#[tokio::test]
async fn serve_answers_twoway_and_stays_silent_for_oneway() {
    let adapter = echo_adapter();

    let mut request = RequestFrame::new("Echo", "echo", Mode::Twoway, b"hi".to_vec());
    request.seq = 9;
    let reply = adapter.serve(&Frame::Request(request).to_bytes().unwrap()).await.unwrap();
    assert_eq!(
        Frame::from_bytes(&reply).unwrap(),
        Frame::Reply(ReplyFrame { seq: 9, status: ReplyStatus::Ok(b"hi".to_vec()) })
    );

    let oneway = RequestFrame::new("Echo", "echo", Mode::Oneway, vec![]);
    assert!(adapter.serve(&Frame::Request(oneway).to_bytes().unwrap()).await.is_none());
    assert!(adapter.serve(b"\xff\xff").await.is_none());
}

#[tokio::test]
async fn serve_encodes_user_exceptions() {
    let adapter = echo_adapter();
    let mut request = RequestFrame::new("Echo", "fail", Mode::Twoway, vec![]);
    request.seq = 1;
    let reply = adapter.serve(&Frame::Request(request).to_bytes().unwrap()).await.unwrap();

    let Frame::Reply(ReplyFrame { status: ReplyStatus::UserException(bytes), .. }) = Frame::from_bytes(&reply).unwrap()
    else {
        panic!("expected a user exception");
    };
    assert_eq!(farwire::unpack::<String>(&bytes).unwrap(), "refused");
}

#[test]
fn registry_finds_only_active_hosting_adapters() {
    let registry = AdapterRegistry::new();
    let adapter = echo_adapter();
    registry.insert(Arc::clone(&adapter)).unwrap();
    assert!(registry.insert(echo_adapter()).is_err());

    let target = Reference::new("Echo", vec![Endpoint::tcp("far", 1), Endpoint::mem("echo")]).unwrap();
    assert!(registry.find_collocated(&target).is_none());

    adapter.activate();
    assert!(registry.find_collocated(&target).is_some());

    let unrelated = target.with_endpoints(vec![Endpoint::tcp("far", 1)]);
    assert!(registry.find_collocated(&unrelated).is_none());
}
