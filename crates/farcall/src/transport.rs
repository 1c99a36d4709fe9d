//! # Transport Abstraction
//!
//! A minimal, async interface for moving frames between a client and a server.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: a Transport knows nothing about requests, replies or
//!   references. It moves opaque, already-delimited buffers.
//! - **Duplex**: sending and receiving are independent. Correlating a reply to
//!   its request is the [`Emitter`](crate::emitter::Emitter)'s job, not the
//!   transport's.
//! - **One per endpoint**: a [`Connector`] turns an endpoint into a live
//!   transport; pooling and reuse happen above it.

use farwire::Endpoint;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The endpoint actively refused or could not be reached.
    ConnectionRefused(String),
    /// The peer dropped the connection.
    ConnectionLost(String),
    /// The frame exceeds what the transport can carry.
    PayloadTooLarge(usize),
    /// The connector cannot handle this endpoint's protocol.
    Unsupported(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionRefused(msg) => write!(f, "Connection refused: {}", msg),
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::PayloadTooLarge(len) => write!(f, "Payload of {} bytes too large for transport", len),
            Self::Unsupported(msg) => write!(f, "Unsupported endpoint: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A live, framed, duplex connection.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Hands one frame to the transport.
    ///
    /// # invariants
    /// - Returns once the frame is handed off; delivery is not confirmed.
    /// - Must not interpret the payload.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Waits for the next frame. `Ok(None)` means the peer closed the stream.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;

    /// Shuts the connection down. Further sends fail.
    async fn close(&self) {}
}

/// Establishes transports to endpoints.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Endpoint, secure: bool) -> Result<Box<dyn Transport>>;
}
