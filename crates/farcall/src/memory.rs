//! In-process transports.
//!
//! [`MemoryConnector`] connects `mem` endpoints to object adapters in the same
//! process, each connection served by its own task through
//! [`ObjectAdapter::serve`]. It can refuse or stall connections and misbehave
//! on requests, which is what the retry tests are built on.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use farwire::Endpoint;
use farwire::Frame;
use farwire::Protocol;

use crate::adapter::ObjectAdapter;
use crate::transport;
use crate::transport::Connector;
use crate::transport::Transport;

/// One end of an in-memory duplex channel.
pub struct MemoryTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryTransport {
    /// Two transports wired to each other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self {
            tx: Mutex::new(Some(tx_a)),
            rx: Mutex::new(rx_b),
        };
        let b = Self {
            tx: Mutex::new(Some(tx_b)),
            rx: Mutex::new(rx_a),
        };
        (a, b)
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, payload: &[u8]) -> transport::Result<()> {
        let tx = self.tx.lock().await;
        let tx = tx
            .as_ref()
            .ok_or_else(|| transport::Error::ConnectionLost("transport closed".into()))?;
        tx.send(payload.to_vec())
            .map_err(|_| transport::Error::ConnectionLost("channel closed".into()))
    }

    async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }

    async fn close(&self) {
        self.tx.lock().await.take();
    }
}

/// Misbehaviour applied to the next request an endpoint receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFault {
    /// Swallow the request without answering.
    Silent,
    /// Drop the connection without answering.
    Drop,
    /// Send a close notice instead of an answer, then drop the connection.
    Close,
}

#[derive(Default)]
struct Station {
    adapter: Option<Arc<ObjectAdapter>>,
    refusals: usize,
    hang: bool,
    faults: VecDeque<RequestFault>,
    connects: usize,
    received: Vec<Frame>,
}

/// Connects `mem` endpoints to adapters registered with [`serve`](Self::serve).
#[derive(Clone, Default)]
pub struct MemoryConnector {
    stations: Arc<DashMap<Endpoint, Station>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves every endpoint of `adapter`. The adapter must be active for
    /// connections to succeed.
    pub fn serve(&self, adapter: Arc<ObjectAdapter>) {
        for endpoint in adapter.endpoints() {
            self.stations.entry(endpoint.clone()).or_default().adapter = Some(Arc::clone(&adapter));
        }
    }

    /// Refuses the next `times` connection attempts to `endpoint`.
    pub fn refuse(&self, endpoint: &Endpoint, times: usize) {
        self.stations.entry(endpoint.clone()).or_default().refusals += times;
    }

    /// Makes connection attempts to `endpoint` never complete.
    pub fn hang(&self, endpoint: &Endpoint, hang: bool) {
        self.stations.entry(endpoint.clone()).or_default().hang = hang;
    }

    /// Queues a fault for the next frame `endpoint` receives.
    pub fn inject(&self, endpoint: &Endpoint, fault: RequestFault) {
        self.stations.entry(endpoint.clone()).or_default().faults.push_back(fault);
    }

    /// Connection attempts made to `endpoint`, successful or not.
    pub fn connects(&self, endpoint: &Endpoint) -> usize {
        self.stations.get(endpoint).map_or(0, |station| station.connects)
    }

    /// Frames `endpoint` has received, in arrival order.
    pub fn received(&self, endpoint: &Endpoint) -> Vec<Frame> {
        self.stations
            .get(endpoint)
            .map_or_else(Vec::new, |station| station.received.clone())
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &Endpoint, _secure: bool) -> transport::Result<Box<dyn Transport>> {
        if endpoint.protocol != Protocol::Mem {
            return Err(transport::Error::Unsupported(endpoint.to_string()));
        }

        let (adapter, hang) = {
            let mut station = self.stations.entry(endpoint.clone()).or_default();
            station.connects += 1;
            if station.refusals > 0 {
                station.refusals -= 1;
                return Err(transport::Error::ConnectionRefused(endpoint.to_string()));
            }
            (station.adapter.clone(), station.hang)
        };

        if hang {
            std::future::pending::<()>().await;
        }

        let adapter = adapter
            .filter(|adapter| adapter.is_active())
            .ok_or_else(|| transport::Error::ConnectionRefused(format!("nothing listens on {}", endpoint)))?;

        let (client, server) = MemoryTransport::pair();
        tokio::spawn(run_server(Arc::clone(&self.stations), endpoint.clone(), adapter, server));
        Ok(Box::new(client))
    }
}

async fn run_server(
    stations: Arc<DashMap<Endpoint, Station>>,
    endpoint: Endpoint,
    adapter: Arc<ObjectAdapter>,
    server: MemoryTransport,
) {
    while let Ok(Some(bytes)) = server.recv().await {
        let fault = {
            let mut station = stations.entry(endpoint.clone()).or_default();
            if let Ok(frame) = Frame::from_bytes(&bytes) {
                station.received.push(frame);
            }
            station.faults.pop_front()
        };

        match fault {
            Some(RequestFault::Silent) => continue,
            Some(RequestFault::Drop) => break,
            Some(RequestFault::Close) => {
                if let Ok(notice) = Frame::CloseConnection.to_bytes() {
                    let _ = server.send(&notice).await;
                }
                break;
            }
            None => {}
        }

        if let Some(reply) = adapter.serve(&bytes).await {
            if server.send(&reply).await.is_err() {
                break;
            }
        }
    }
    debug!(%endpoint, "memory connection closed");
}
