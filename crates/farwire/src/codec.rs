//! Frame and argument marshaling.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::error::Result;
use crate::frame::Frame;

/// Encodes a frame for transmission.
pub fn encode(frame: &Frame) -> Result<Vec<u8>> {
    postcard::to_allocvec(frame).map_err(|e| Error::Encode(e.to_string()))
}

/// Decodes a frame received from a transport.
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    postcard::from_bytes(bytes).map_err(|e| Error::Decode(e.to_string()))
}

/// Marshals a typed argument or result value.
pub fn pack<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(value).map_err(|e| Error::Encode(e.to_string()))
}

/// Demarshals a typed argument or result value.
pub fn unpack<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    postcard::from_bytes(bytes).map_err(|e| Error::Decode(e.to_string()))
}
