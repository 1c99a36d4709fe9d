//! # Farcall
//!
//! Location-transparent proxies for remote objects.
//!
//! A caller holds an [`ObjectPrx`] (or a typed [`Proxy`]) and invokes
//! operations on it. Whether the object lives in another process or in an
//! adapter of the same [`Runtime`], and whether the call is twoway, oneway,
//! batched or datagram, is decided by the proxy's [`Reference`] and the
//! delegate bound for it. Transport failures and location-forwards are
//! handled inside the proxy according to the runtime's [`Config`].

pub mod adapter;
pub mod config;
pub mod delegate;
pub mod emitter;
pub mod error;
pub mod factory;
pub mod memory;
pub mod payload;
pub mod proxy;
pub mod reference;
pub mod retry;
pub mod runtime;
pub mod tcp;
pub mod transport;

pub use adapter::Current;
pub use adapter::DispatchError;
pub use adapter::DispatchResult;
pub use adapter::OBJECT_TYPE_ID;
pub use adapter::ObjectAdapter;
pub use adapter::Servant;
pub use config::Config;
pub use config::EndpointSelection;
pub use error::Error;
pub use error::FailureKind;
pub use error::Result;
pub use error::TransportFailure;
pub use factory::ProxyFactory;
pub use farwire::Endpoint;
pub use farwire::Mode;
pub use payload::Invocation;
pub use payload::Payload;
pub use proxy::ObjectPrx;
pub use proxy::Proxy;
pub use proxy::WeakPrx;
pub use reference::Reference;
pub use runtime::Runtime;

#[cfg(test)]
mod tests;
