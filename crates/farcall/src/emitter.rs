//! # Emitters
//!
//! An [`Emitter`] owns one live transport and multiplexes every marshaled
//! delegate that shares its [`EmitterKey`]. A background reader task
//! demultiplexes replies and routes them to the waiting caller by sequence
//! number. Batch-mode requests accumulate in a per-emitter buffer until they
//! are flushed as one frame.
//!
//! The [`EmitterPool`] hands out shared emitters. It keeps only weak slots,
//! so the last delegate to drop an emitter is the one that closes it. A
//! released emitter takes its slot with it.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use farwire::Endpoint;
use farwire::Frame;
use farwire::ReplyStatus;
use farwire::RequestFrame;

use crate::config::EndpointSelection;
use crate::error::Error;
use crate::error::FailureKind;
use crate::error::Result;
use crate::error::TransportFailure;
use crate::reference::Reference;
use crate::transport::Connector;
use crate::transport::Transport;

type PendingReply = oneshot::Sender<std::result::Result<ReplyStatus, TransportFailure>>;
type Slot = Arc<Mutex<Weak<Emitter>>>;

/// The instant a wait must end by, with the budget it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// Starts counting `budget` now.
    pub fn after(budget: Duration) -> Self {
        Self { at: Instant::now() + budget, budget }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn has_passed(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// Which marshaled delegates may share a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmitterKey {
    endpoints: Vec<Endpoint>,
    secure: bool,
    timeout_ms: Option<u32>,
    datagram: bool,
}

impl EmitterKey {
    /// Keeps the reference's endpoints usable for its mode and security.
    /// Fails with `NoEndpoint` when none remain.
    pub fn for_reference(reference: &Reference) -> Result<Self> {
        let datagram = reference.mode().is_datagram();
        let secure = reference.secure();
        let endpoints: Vec<Endpoint> = reference
            .endpoints()
            .iter()
            .filter(|e| if datagram { e.supports_datagram() } else { e.supports_stream() })
            .filter(|e| !secure || e.is_secure())
            .cloned()
            .collect();

        if endpoints.is_empty() {
            return Err(Error::Transport(TransportFailure::new(
                FailureKind::NoEndpoint,
                format!("no {} endpoint for {}", if datagram { "datagram" } else { "stream" }, reference),
            )));
        }

        Ok(Self {
            endpoints,
            secure,
            timeout_ms: reference.timeout_ms(),
            datagram,
        })
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

/// One connection shared by compatible marshaled delegates.
pub struct Emitter {
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    pending: Arc<DashMap<u64, PendingReply>>,
    seq_gen: AtomicU64,
    batch: Mutex<Vec<RequestFrame>>,
    closed: Arc<AtomicBool>,
    pump: JoinHandle<()>,
    release: Option<SlotRelease>,
}

impl Emitter {
    /// Connects to the first reachable endpoint of `key`.
    ///
    /// All endpoint attempts together must finish by `deadline`. The error of
    /// the last endpoint tried is reported if none succeeds.
    pub async fn connect(
        connector: &dyn Connector,
        key: &EmitterKey,
        deadline: Option<Deadline>,
        selection: EndpointSelection,
    ) -> Result<Self> {
        let mut endpoints = key.endpoints.clone();
        if selection == EndpointSelection::Random {
            endpoints.shuffle(&mut rand::thread_rng());
        }

        let mut last_failure = None;
        for endpoint in endpoints {
            let attempt = connector.connect(&endpoint, key.secure);
            let connected = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline.at(), attempt).await {
                    Ok(connected) => connected,
                    Err(_) => {
                        // the remaining endpoints share the same deadline
                        warn!(%endpoint, budget = ?deadline.budget(), "connect timed out");
                        return Err(Error::Transport(TransportFailure::new(
                            FailureKind::ConnectTimeout,
                            format!("{} within {:?}", endpoint, deadline.budget()),
                        )));
                    }
                },
                None => attempt.await,
            };

            match connected {
                Ok(transport) => {
                    debug!(%endpoint, "connection established");
                    return Ok(Self::start(endpoint, Arc::from(transport)));
                }
                Err(e) => {
                    warn!(%endpoint, error = %e, "connect failed");
                    last_failure = Some(TransportFailure::new(FailureKind::ConnectFailed, e.to_string()));
                }
            }
        }

        let failure = last_failure
            .unwrap_or_else(|| TransportFailure::new(FailureKind::NoEndpoint, "no endpoints to connect to"));
        Err(Error::Transport(failure))
    }

    /// Wraps an established transport and spawns the reader task.
    pub fn start(endpoint: Endpoint, transport: Arc<dyn Transport>) -> Self {
        let pending = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let pump_transport = Arc::clone(&transport);
        let pump_pending = Arc::clone(&pending);
        let pump_closed = Arc::clone(&closed);
        let pump_endpoint = endpoint.clone();

        let pump = tokio::spawn(async move {
            let failure = loop {
                match pump_transport.recv().await {
                    Ok(Some(bytes)) => {
                        if let Err(failure) = Self::handle_message(&bytes, &pump_pending) {
                            break failure;
                        }
                    }
                    Ok(None) => {
                        break TransportFailure::new(FailureKind::ConnectionLost, "stream closed");
                    }
                    Err(e) => {
                        break TransportFailure::new(FailureKind::ConnectionLost, e.to_string());
                    }
                }
            };

            debug!(endpoint = %pump_endpoint, %failure, "emitter reader stopped");
            pump_closed.store(true, Ordering::SeqCst);
            Self::notify_all_pending(&pump_pending, failure);
            pump_transport.close().await;
        });

        Self {
            endpoint,
            transport,
            pending,
            seq_gen: AtomicU64::new(1),
            batch: Mutex::new(Vec::new()),
            closed,
            pump,
            release: None,
        }
    }

    /// Routes one inbound frame. An error stops the reader.
    fn handle_message(bytes: &[u8], pending: &DashMap<u64, PendingReply>) -> std::result::Result<(), TransportFailure> {
        let frame = Frame::from_bytes(bytes)
            .map_err(|e| TransportFailure::new(FailureKind::ConnectionLost, e.to_string()))?;

        match frame {
            Frame::Reply(reply) => {
                // a reply nobody waits for is a late answer to an abandoned call
                if let Some((_, tx)) = pending.remove(&reply.seq) {
                    let _ = tx.send(Ok(reply.status));
                } else {
                    trace!(seq = reply.seq, "dropping reply without a waiting caller");
                }
                Ok(())
            }
            Frame::CloseConnection => Err(TransportFailure::new(
                FailureKind::ConnectionClosed,
                "peer closed the connection",
            )),
            Frame::Request(_) | Frame::Batch(_) => {
                let violation = farwire::Error::ProtocolViolation("request frame received by a client".into());
                Err(TransportFailure::new(FailureKind::ConnectionLost, violation.to_string()))
            }
        }
    }

    fn notify_all_pending(pending: &DashMap<u64, PendingReply>, failure: TransportFailure) {
        let keys: Vec<u64> = pending.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, tx)) = pending.remove(&key) {
                let _ = tx.send(Err(failure.clone()));
            }
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn not_sent(&self) -> Error {
        Error::Transport(TransportFailure::new(
            FailureKind::NotSent,
            format!("connection to {} is closed", self.endpoint),
        ))
    }

    async fn transmit(&self, frame: &Frame) -> Result<()> {
        let bytes = frame.to_bytes()?;
        self.transport.send(&bytes).await.map_err(|e| {
            Error::Transport(TransportFailure::new(FailureKind::SendFailed, e.to_string()))
        })
    }

    /// Sends a twoway request and waits for its reply until `deadline`.
    pub async fn request(&self, mut frame: RequestFrame, deadline: Option<Deadline>) -> Result<ReplyStatus> {
        if self.is_closed() {
            return Err(self.not_sent());
        }

        let seq = self.seq_gen.fetch_add(1, Ordering::Relaxed);
        frame.seq = seq;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);

        // the reader may have drained `pending` between the check and the insert
        if self.is_closed() {
            self.pending.remove(&seq);
            return Err(self.not_sent());
        }

        if let Err(e) = self.transmit(&Frame::Request(frame)).await {
            self.pending.remove(&seq);
            return Err(e);
        }

        let reply = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline.at(), rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.pending.remove(&seq);
                    return Err(Error::Timeout { after: deadline.budget() });
                }
            },
            None => rx.await,
        };

        match reply {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(failure)) => Err(Error::Transport(failure)),
            Err(_) => Err(Error::Transport(TransportFailure::new(
                FailureKind::ConnectionLost,
                "reply channel closed",
            ))),
        }
    }

    /// Hands a request that expects no reply to the transport.
    pub async fn send_oneway(&self, mut frame: RequestFrame) -> Result<()> {
        if self.is_closed() {
            return Err(self.not_sent());
        }
        frame.seq = 0;
        self.transmit(&Frame::Request(frame)).await
    }

    /// Buffers a request until the next [`flush_batch`](Self::flush_batch).
    pub async fn enqueue(&self, mut frame: RequestFrame) -> Result<()> {
        if self.is_closed() {
            return Err(self.not_sent());
        }
        frame.seq = 0;
        self.batch.lock().await.push(frame);
        Ok(())
    }

    /// Sends everything buffered so far as one batch frame and returns how
    /// many requests it carried. Requests enqueued concurrently land in the
    /// next batch.
    pub async fn flush_batch(&self) -> Result<usize> {
        let requests = std::mem::take(&mut *self.batch.lock().await);
        if requests.is_empty() {
            return Ok(0);
        }
        if self.is_closed() {
            warn!(endpoint = %self.endpoint, dropped = requests.len(), "discarding batch for closed connection");
            return Err(self.not_sent());
        }

        let count = requests.len();
        trace!(endpoint = %self.endpoint, count, "flushing batch");
        self.transmit(&Frame::Batch(requests)).await?;
        Ok(count)
    }

    /// Requests buffered and not yet flushed.
    pub async fn batched(&self) -> usize {
        self.batch.lock().await.len()
    }
}

impl Drop for Emitter {
    fn drop(&mut self) {
        debug!(endpoint = %self.endpoint, "releasing emitter");
        self.closed.store(true, Ordering::SeqCst);
        self.pump.abort();

        // outside a runtime the transport is only dropped
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let transport = Arc::clone(&self.transport);
            handle.spawn(async move { transport.close().await });
        }

        if let Some(release) = self.release.take() {
            release.run(self);
        }
    }
}

/// Lets a pooled emitter remove its own slot when it is released.
struct SlotRelease {
    slots: Weak<DashMap<EmitterKey, Slot>>,
    key: EmitterKey,
}

impl SlotRelease {
    /// Removes the slot if it still points at `emitter` and no caller is
    /// connecting through it.
    fn run(self, emitter: &Emitter) {
        let Some(slots) = self.slots.upgrade() else {
            return;
        };
        slots.remove_if(&self.key, |_, slot| {
            Arc::strong_count(slot) == 1
                && slot
                    .try_lock()
                    .is_ok_and(|current| std::ptr::eq(current.as_ptr(), emitter))
        });
    }
}

/// Shared emitters keyed by [`EmitterKey`].
///
/// Establishing a connection is serialized per key only; callers for other
/// keys never wait on it.
pub struct EmitterPool {
    connector: Arc<dyn Connector>,
    slots: Arc<DashMap<EmitterKey, Slot>>,
}

impl EmitterPool {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            slots: Arc::new(DashMap::new()),
        }
    }

    /// Returns the live emitter for `key`, connecting a new one if the
    /// previous one was released or closed.
    pub async fn acquire(
        &self,
        key: &EmitterKey,
        deadline: Option<Deadline>,
        selection: EndpointSelection,
    ) -> Result<Arc<Emitter>> {
        let slot = Arc::clone(&*self.slots.entry(key.clone()).or_default());
        let mut current = slot.lock().await;

        if let Some(emitter) = current.upgrade() {
            if !emitter.is_closed() {
                trace!(endpoint = %emitter.endpoint(), "reusing emitter");
                return Ok(emitter);
            }
        }

        let mut emitter = match Emitter::connect(&*self.connector, key, deadline, selection).await {
            Ok(emitter) => emitter,
            Err(e) => {
                drop(current);
                // ours and the map's are the only handles left
                self.slots
                    .remove_if(key, |_, s| Arc::ptr_eq(s, &slot) && Arc::strong_count(s) == 2);
                return Err(e);
            }
        };
        emitter.release = Some(SlotRelease {
            slots: Arc::downgrade(&self.slots),
            key: key.clone(),
        });

        let emitter = Arc::new(emitter);
        *current = Arc::downgrade(&emitter);
        drop(current);
        self.sweep();
        Ok(emitter)
    }

    /// Drops slots whose emitter is gone and that nobody is connecting
    /// through.
    fn sweep(&self) {
        self.slots.retain(|_, slot| {
            Arc::strong_count(slot) > 1 || slot.try_lock().map_or(true, |current| current.strong_count() > 0)
        });
    }

    /// Number of keys the pool currently tracks.
    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    /// The live emitter for `key`, without connecting.
    pub fn existing(&self, key: &EmitterKey) -> Option<Arc<Emitter>> {
        let slot = Arc::clone(&*self.slots.get(key)?);
        // a slot that is mid-connect has nothing flushable yet
        let current = slot.try_lock().ok()?;
        current.upgrade().filter(|emitter| !emitter.is_closed())
    }

    /// Number of emitters currently alive and open.
    pub fn live(&self) -> usize {
        // an upgraded emitter may be the last handle, and its drop edits the map
        let slots: Vec<Slot> = self.slots.iter().map(|entry| Arc::clone(entry.value())).collect();
        slots
            .iter()
            .filter(|slot| {
                slot.try_lock()
                    .map(|current| current.upgrade().is_some_and(|emitter| !emitter.is_closed()))
                    .unwrap_or(false)
            })
            .count()
    }
}
