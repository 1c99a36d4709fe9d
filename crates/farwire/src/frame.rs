//! # Protocol Frames
//!
//! Defines the envelope exchanged between a client emitter and a server:
//! single requests, batches, replies and the graceful close notice.
//!
//! ## Invariants
//! - **Correlation**: a reply carries the `seq` of the request it answers.
//!   Requests that expect no reply carry `seq == 0`.
//! - **Panic Safety**: decoding never panics on malformed input; it returns
//!   [`Error::Decode`](crate::Error::Decode).

use serde::Deserialize;
use serde::Serialize;

use crate::codec;
use crate::error::Result;
use crate::types::Mode;
use crate::types::WireReference;

/// A single marshaled invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub seq: u64,
    pub identity: String,
    pub operation: String,
    pub mode: Mode,
    /// The caller declared the operation safe to execute more than once.
    pub idempotent: bool,
    /// Arguments as produced by [`pack`](crate::pack) or a generated stub.
    pub args: Vec<u8>,
}

impl RequestFrame {
    pub fn new(
        identity: impl Into<String>,
        operation: impl Into<String>,
        mode: Mode,
        args: Vec<u8>,
    ) -> Self {
        Self {
            seq: 0,
            identity: identity.into(),
            operation: operation.into(),
            mode,
            idempotent: false,
            args,
        }
    }

    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Whether the server must answer this request.
    pub fn expects_reply(&self) -> bool {
        self.seq != 0 && self.mode.expects_reply()
    }
}

/// Outcome of a dispatched request, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyStatus {
    /// Marshaled results.
    Ok(Vec<u8>),
    /// The servant raised an application exception; the payload is opaque.
    UserException(Vec<u8>),
    /// No servant is registered under the identity.
    ObjectNotExist,
    /// The servant does not implement the operation.
    OperationNotExist,
    /// The object lives elsewhere; retry against the carried reference.
    LocationForward(WireReference),
    /// The server failed in a way it could not describe further.
    Unknown(String),
}

/// Answer to a twoway request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub seq: u64,
    pub status: ReplyStatus,
}

/// Top-level message on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Request(RequestFrame),
    /// Requests accumulated in batch mode, delivered in order.
    Batch(Vec<RequestFrame>),
    Reply(ReplyFrame),
    /// The server is shutting the connection down and has not dispatched
    /// any request still awaiting a reply.
    CloseConnection,
}

impl Frame {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        codec::encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        codec::decode(bytes)
    }
}
