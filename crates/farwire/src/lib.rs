//! # Farwire
//!
//! The encoding layer underneath farcall proxies.
//!
//! ## Architecture
//!
//! The proxy runtime never looks at bytes directly. It hands this crate a
//! [`Frame`] and gets bytes back, and the reverse on receipt. Everything that
//! crosses a connection is one of four frames: a request, a batch of requests,
//! a reply, or a close notice. Argument payloads inside requests are opaque to
//! the framing; [`pack`] and [`unpack`] are the helpers generated stubs use to
//! fill them.

mod codec;
mod error;
mod frame;
mod types;

pub use codec::decode;
pub use codec::encode;
pub use codec::pack;
pub use codec::unpack;
pub use error::Error;
pub use error::Result;
pub use frame::Frame;
pub use frame::ReplyFrame;
pub use frame::ReplyStatus;
pub use frame::RequestFrame;
pub use types::Endpoint;
pub use types::Mode;
pub use types::Protocol;
pub use types::WireReference;

#[cfg(test)]
mod tests;
