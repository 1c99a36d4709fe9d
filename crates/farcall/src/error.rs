//! # Invocation Errors
//!
//! The terminal failures a caller can observe from a proxy operation.
//! Classification into retryable and fatal lives in [`crate::retry`]; this
//! module only names what went wrong.

use std::time::Duration;

use crate::payload::Payload;

/// Why a transport-level failure happened, which decides whether a retry
/// could duplicate the request on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No connection could be established to any endpoint.
    ConnectFailed,
    /// Connection establishment exceeded the timeout.
    ConnectTimeout,
    /// The reference has no endpoint usable for its mode and security.
    NoEndpoint,
    /// The request was never handed to a transport.
    NotSent,
    /// The server closed the connection gracefully before answering; it
    /// promises not to have dispatched the outstanding requests.
    ConnectionClosed,
    /// Writing the request failed part-way.
    SendFailed,
    /// The connection dropped while a reply was outstanding.
    ConnectionLost,
    /// Too many location-forwards within one call.
    ForwardLimit,
}

impl FailureKind {
    /// The request provably never reached a server.
    pub fn never_sent(self) -> bool {
        matches!(
            self,
            FailureKind::ConnectFailed
                | FailureKind::ConnectTimeout
                | FailureKind::NotSent
                | FailureKind::ConnectionClosed
        )
    }

    /// The request may or may not have been executed.
    pub fn is_ambiguous(self) -> bool {
        matches!(self, FailureKind::SendFailed | FailureKind::ConnectionLost)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::ConnectFailed => "connect failed",
            FailureKind::ConnectTimeout => "connect timed out",
            FailureKind::NoEndpoint => "no usable endpoint",
            FailureKind::NotSent => "request not sent",
            FailureKind::ConnectionClosed => "connection closed by peer",
            FailureKind::SendFailed => "send failed",
            FailureKind::ConnectionLost => "connection lost",
            FailureKind::ForwardLimit => "too many location forwards",
        };
        f.write_str(name)
    }
}

/// A connection could not be established or was lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl TransportFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    /// Malformed input to a reference or proxy mutation.
    InvalidArgument(String),
    Transport(TransportFailure),
    /// No object with this identity exists at the target.
    ObjectNotFound { identity: String },
    /// The object exists but does not implement the operation.
    OperationNotFound { identity: String, operation: String },
    /// The remote implementation raised an application exception.
    Remote(Payload),
    /// A twoway call was abandoned locally; the server may still execute it.
    Timeout { after: Duration },
    /// The server failed without a describable reason.
    Unknown(String),
    /// Frames or argument payloads could not be encoded or decoded.
    Protocol(farwire::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Self::Transport(e) => write!(f, "Transport failure: {}", e),
            Self::ObjectNotFound { identity } => write!(f, "Object not found: {}", identity),
            Self::OperationNotFound { identity, operation } => {
                write!(f, "Operation '{}' not found on {}", operation, identity)
            }
            Self::Remote(payload) => write!(f, "Remote application exception: {:?}", payload),
            Self::Timeout { after } => write!(f, "Invocation timed out after {:?}", after),
            Self::Unknown(msg) => write!(f, "Unknown remote failure: {}", msg),
            Self::Protocol(e) => write!(f, "Protocol error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportFailure> for Error {
    fn from(e: TransportFailure) -> Self {
        Self::Transport(e)
    }
}

impl From<farwire::Error> for Error {
    fn from(e: farwire::Error) -> Self {
        Self::Protocol(e)
    }
}

impl Error {
    /// The transport failure kind, if this is a transport failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Transport(failure) => Some(failure.kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
