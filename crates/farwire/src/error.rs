//! # Error Definitions
//!
//! Failures of the encoding layer itself. A remote object failing is not an
//! encoding error; those travel inside a [`ReplyStatus`](crate::ReplyStatus).

/// Operational failures while turning frames into bytes and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Serialization of a frame or argument value failed.
    Encode(String),
    /// The bytes did not decode into the expected shape (truncated, wrong type).
    Decode(String),
    /// A well-formed frame arrived where the protocol does not allow it.
    ProtocolViolation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(msg) => write!(f, "Encode error: {}", msg),
            Self::Decode(msg) => write!(f, "Decode error: {}", msg),
            Self::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;
