//! # Object Adapters
//!
//! An [`ObjectAdapter`] is the dispatch table of one server endpoint set: it
//! maps identities to [`Servant`]s, or to forward references for objects
//! that live elsewhere. Collocated proxies call into it directly; in-memory
//! transports call [`ObjectAdapter::serve`] with encoded frames to play the
//! part of a remote server.
//!
//! The reserved operations `_is_a` and `_ping` are answered here, from the
//! servant's declared type ids, so servants only implement their own
//! operations.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use farwire::Endpoint;
use farwire::Frame;
use farwire::Mode;
use farwire::ReplyFrame;
use farwire::ReplyStatus;
use farwire::RequestFrame;

use crate::payload::IS_A_OPERATION;
use crate::payload::PING_OPERATION;
use crate::payload::Payload;
use crate::reference::Reference;

/// Type id every object implements.
pub const OBJECT_TYPE_ID: &str = "::farcall::Object";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A servant or forward already uses this identity.
    AlreadyRegistered(String),
    EmptyIdentity,
    /// An adapter with this name already exists in the runtime.
    DuplicateAdapter(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRegistered(id) => write!(f, "Identity already registered: {}", id),
            Self::EmptyIdentity => write!(f, "Identity must not be empty"),
            Self::DuplicateAdapter(name) => write!(f, "Adapter already exists: {}", name),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-dispatch information handed to a servant.
#[derive(Debug, Clone)]
pub struct Current {
    pub identity: String,
    pub operation: String,
    pub mode: Mode,
    /// Name of the dispatching adapter.
    pub adapter: String,
    /// The call came through a direct delegate and never left the process.
    pub collocated: bool,
}

/// Ways a dispatch can end without results.
#[derive(Debug, Clone)]
pub enum DispatchError {
    /// Application exception, delivered to the caller as-is.
    User(Payload),
    ObjectNotExist,
    OperationNotExist,
    /// The object lives at another reference.
    LocationForward(Reference),
    Unknown(String),
}

pub type DispatchResult = std::result::Result<Payload, DispatchError>;

/// A server-side object implementation.
#[async_trait::async_trait]
pub trait Servant: Send + Sync + 'static {
    /// Interfaces this object implements, most derived first.
    fn type_ids(&self) -> &[&'static str];

    async fn dispatch(&self, current: &Current, args: Payload) -> DispatchResult;
}

/// Result of an identity lookup.
#[derive(Clone)]
pub enum Lookup {
    Servant(Arc<dyn Servant>),
    Forward(Reference),
    NotFound,
}

impl std::fmt::Debug for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Servant(_) => f.write_str("Servant(..)"),
            Lookup::Forward(r) => write!(f, "Forward({})", r),
            Lookup::NotFound => f.write_str("NotFound"),
        }
    }
}

/// Identity-to-servant table for a set of endpoints.
pub struct ObjectAdapter {
    name: String,
    endpoints: Vec<Endpoint>,
    servants: DashMap<String, Arc<dyn Servant>>,
    forwards: DashMap<String, Reference>,
    active: AtomicBool,
}

impl ObjectAdapter {
    /// A new, inactive adapter.
    pub fn new(name: impl Into<String>, endpoints: Vec<Endpoint>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            endpoints,
            servants: DashMap::new(),
            forwards: DashMap::new(),
            active: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn add(&self, identity: impl Into<String>, servant: Arc<dyn Servant>) -> Result<()> {
        let identity = self.vacant(identity.into())?;
        debug!(adapter = %self.name, %identity, "servant added");
        self.servants.insert(identity, servant);
        Ok(())
    }

    pub fn remove(&self, identity: &str) -> Option<Arc<dyn Servant>> {
        self.servants.remove(identity).map(|(_, servant)| servant)
    }

    /// Answers requests for `identity` with a location-forward to `target`.
    pub fn add_forward(&self, identity: impl Into<String>, target: Reference) -> Result<()> {
        let identity = self.vacant(identity.into())?;
        debug!(adapter = %self.name, %identity, %target, "forward added");
        self.forwards.insert(identity, target);
        Ok(())
    }

    pub fn remove_forward(&self, identity: &str) -> Option<Reference> {
        self.forwards.remove(identity).map(|(_, target)| target)
    }

    fn vacant(&self, identity: String) -> Result<String> {
        if identity.is_empty() {
            return Err(Error::EmptyIdentity);
        }
        if self.servants.contains_key(&identity) || self.forwards.contains_key(&identity) {
            return Err(Error::AlreadyRegistered(identity));
        }
        Ok(identity)
    }

    pub fn lookup(&self, identity: &str) -> Lookup {
        if let Some(servant) = self.servants.get(identity) {
            return Lookup::Servant(Arc::clone(servant.value()));
        }
        if let Some(target) = self.forwards.get(identity) {
            return Lookup::Forward(target.value().clone());
        }
        Lookup::NotFound
    }

    pub fn activate(&self) {
        debug!(adapter = %self.name, "activated");
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn deactivate(&self) {
        debug!(adapter = %self.name, "deactivated");
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Whether this adapter is active and listens on one of the reference's
    /// endpoints.
    pub fn hosts(&self, reference: &Reference) -> bool {
        self.is_active() && reference.endpoints().iter().any(|e| self.endpoints.contains(e))
    }

    /// Runs one operation against the object registered under `identity`.
    pub async fn dispatch(
        &self,
        identity: &str,
        operation: &str,
        mode: Mode,
        args: Payload,
        collocated: bool,
    ) -> DispatchResult {
        let servant = match self.lookup(identity) {
            Lookup::Servant(servant) => servant,
            Lookup::Forward(target) => return Err(DispatchError::LocationForward(target)),
            Lookup::NotFound => return Err(DispatchError::ObjectNotExist),
        };

        match operation {
            IS_A_OPERATION => {
                let type_id: String = args
                    .decode()
                    .map_err(|e| DispatchError::Unknown(format!("bad _is_a argument: {}", e)))?;
                let is_a = type_id == OBJECT_TYPE_ID || servant.type_ids().iter().any(|id| *id == type_id);
                Ok(Payload::value(is_a))
            }
            PING_OPERATION => Ok(Payload::empty()),
            _ => {
                let current = Current {
                    identity: identity.to_string(),
                    operation: operation.to_string(),
                    mode,
                    adapter: self.name.clone(),
                    collocated,
                };
                servant.dispatch(&current, args).await
            }
        }
    }

    /// Answers one encoded frame the way a server would.
    ///
    /// Returns the encoded reply for a twoway request and `None` for
    /// everything that expects no answer. Batched requests are dispatched in
    /// order. Undecodable input is logged and dropped.
    pub async fn serve(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        let frame = match Frame::from_bytes(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(adapter = %self.name, error = %e, "dropping undecodable frame");
                return None;
            }
        };

        match frame {
            Frame::Request(request) => self.serve_request(request).await,
            Frame::Batch(requests) => {
                trace!(adapter = %self.name, count = requests.len(), "dispatching batch");
                for request in requests {
                    self.serve_request(request).await;
                }
                None
            }
            Frame::Reply(_) | Frame::CloseConnection => {
                warn!(adapter = %self.name, "ignoring client-bound frame");
                None
            }
        }
    }

    async fn serve_request(&self, request: RequestFrame) -> Option<Vec<u8>> {
        let expects_reply = request.expects_reply();
        let seq = request.seq;
        let result = self
            .dispatch(
                &request.identity,
                &request.operation,
                request.mode,
                Payload::Encoded(request.args),
                false,
            )
            .await;

        if !expects_reply {
            return None;
        }

        let reply = Frame::Reply(ReplyFrame { seq, status: reply_status(result) });
        match reply.to_bytes() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(adapter = %self.name, seq, error = %e, "could not encode reply");
                None
            }
        }
    }
}

fn reply_status(result: DispatchResult) -> ReplyStatus {
    match result {
        Ok(payload) => match payload.into_bytes() {
            Ok(bytes) => ReplyStatus::Ok(bytes),
            Err(e) => ReplyStatus::Unknown(e.to_string()),
        },
        Err(DispatchError::User(payload)) => match payload.into_bytes() {
            Ok(bytes) => ReplyStatus::UserException(bytes),
            Err(e) => ReplyStatus::Unknown(e.to_string()),
        },
        Err(DispatchError::ObjectNotExist) => ReplyStatus::ObjectNotExist,
        Err(DispatchError::OperationNotExist) => ReplyStatus::OperationNotExist,
        Err(DispatchError::LocationForward(target)) => ReplyStatus::LocationForward(target.to_wire()),
        Err(DispatchError::Unknown(msg)) => ReplyStatus::Unknown(msg),
    }
}

/// The adapters of one runtime, by name.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: DashMap<String, Arc<ObjectAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, adapter: Arc<ObjectAdapter>) -> Result<()> {
        match self.adapters.entry(adapter.name().to_string()) {
            Entry::Occupied(entry) => Err(Error::DuplicateAdapter(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(adapter);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ObjectAdapter>> {
        self.adapters.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<ObjectAdapter>> {
        self.adapters.remove(name).map(|(_, adapter)| adapter)
    }

    /// An active adapter hosting one of the reference's endpoints.
    pub fn find_collocated(&self, reference: &Reference) -> Option<Arc<ObjectAdapter>> {
        self.adapters
            .iter()
            .find(|entry| entry.value().hosts(reference))
            .map(|entry| Arc::clone(entry.value()))
    }
}
