//! # Wire Vocabulary
//!
//! Invocation modes, endpoint descriptors and the plain-data form of a
//! reference. These are the values that cross the wire inside frames.

use serde::Deserialize;
use serde::Serialize;

/// How an invocation is delivered and whether a reply is awaited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mode {
    /// Request/reply over a stream connection.
    #[default]
    Twoway,
    /// Fire-and-forget over a stream connection.
    Oneway,
    /// Oneway requests buffered until an explicit flush.
    BatchOneway,
    /// Fire-and-forget over a datagram endpoint.
    Datagram,
    /// Datagram requests buffered until an explicit flush.
    BatchDatagram,
}

impl Mode {
    /// Only twoway invocations wait for a reply.
    pub fn expects_reply(self) -> bool {
        matches!(self, Mode::Twoway)
    }

    pub fn is_batch(self) -> bool {
        matches!(self, Mode::BatchOneway | Mode::BatchDatagram)
    }

    pub fn is_datagram(self) -> bool {
        matches!(self, Mode::Datagram | Mode::BatchDatagram)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Twoway => "twoway",
            Mode::Oneway => "oneway",
            Mode::BatchOneway => "batch-oneway",
            Mode::Datagram => "datagram",
            Mode::BatchDatagram => "batch-datagram",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport family of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Ssl,
    Udp,
    /// In-process channel; never leaves the address space.
    Mem,
}

impl Protocol {
    /// Secure proxies may only use endpoints for which this holds.
    pub fn is_secure(self) -> bool {
        matches!(self, Protocol::Ssl | Protocol::Mem)
    }

    pub fn supports_datagram(self) -> bool {
        matches!(self, Protocol::Udp | Protocol::Mem)
    }

    pub fn supports_stream(self) -> bool {
        !matches!(self, Protocol::Udp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Ssl => "ssl",
            Protocol::Udp => "udp",
            Protocol::Mem => "mem",
        }
    }
}

/// A resolved transport address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(protocol: Protocol, host: impl Into<String>, port: u16) -> Self {
        Self { protocol, host: host.into(), port }
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(Protocol::Tcp, host, port)
    }

    pub fn ssl(host: impl Into<String>, port: u16) -> Self {
        Self::new(Protocol::Ssl, host, port)
    }

    pub fn udp(host: impl Into<String>, port: u16) -> Self {
        Self::new(Protocol::Udp, host, port)
    }

    /// An in-process endpoint addressed by name.
    pub fn mem(name: impl Into<String>) -> Self {
        Self::new(Protocol::Mem, name, 0)
    }

    pub fn is_secure(&self) -> bool {
        self.protocol.is_secure()
    }

    pub fn supports_datagram(&self) -> bool {
        self.protocol.supports_datagram()
    }

    pub fn supports_stream(&self) -> bool {
        self.protocol.supports_stream()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.protocol {
            Protocol::Mem => write!(f, "mem:{}", self.host),
            _ => write!(f, "{}:{}:{}", self.protocol.as_str(), self.host, self.port),
        }
    }
}

/// The plain-data form of a reference, as carried by a location-forward reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireReference {
    pub identity: String,
    pub endpoints: Vec<Endpoint>,
    pub mode: Mode,
    pub secure: bool,
    pub timeout_ms: Option<u32>,
    pub collocation_allowed: bool,
}
