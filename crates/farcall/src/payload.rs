//! # Payloads and Invocations
//!
//! Arguments and results travel through delegates as a [`Payload`]. The
//! marshaled path only ever sees [`Payload::Encoded`] bytes; the direct path
//! passes [`Payload::Value`] through untouched, so a collocated servant hands
//! the caller the very object it produced.

use std::any::Any;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

type SharedAny = dyn Any + Send + Sync;

/// An in-process value that knows how to marshal itself if it has to.
#[derive(Clone)]
pub struct Value {
    inner: Arc<SharedAny>,
    encode: fn(&SharedAny) -> farwire::Result<Vec<u8>>,
}

impl Value {
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T>(value: Arc<T>) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self { inner: value, encode: encode_as::<T> }
    }

    /// Shares the underlying value if it is a `T`.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    pub fn encode(&self) -> farwire::Result<Vec<u8>> {
        (self.encode)(&*self.inner)
    }
}

fn encode_as<T: Serialize + 'static>(value: &SharedAny) -> farwire::Result<Vec<u8>> {
    let value = value
        .downcast_ref::<T>()
        .ok_or_else(|| farwire::Error::Encode("value does not match its encoder".into()))?;
    farwire::pack(value)
}

/// Argument or result of an invocation.
#[derive(Clone)]
pub enum Payload {
    /// Marshaled bytes.
    Encoded(Vec<u8>),
    /// An unmarshaled in-process value.
    Value(Value),
}

impl Payload {
    /// No arguments, or no results.
    pub fn empty() -> Self {
        Payload::Encoded(Vec::new())
    }

    /// Marshals `value` eagerly.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> farwire::Result<Self> {
        farwire::pack(value).map(Payload::Encoded)
    }

    /// Wraps `value` without marshaling it.
    pub fn value<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Payload::Value(Value::new(value))
    }

    /// Marshaled form, encoding a held value if needed.
    pub fn into_bytes(self) -> farwire::Result<Vec<u8>> {
        match self {
            Payload::Encoded(bytes) => Ok(bytes),
            Payload::Value(value) => value.encode(),
        }
    }

    /// Reads the payload as a `T`, either by cloning a held `T` or by
    /// demarshaling bytes.
    pub fn decode<T>(&self) -> farwire::Result<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        match self {
            Payload::Encoded(bytes) => farwire::unpack(bytes),
            Payload::Value(value) => match value.downcast::<T>() {
                Some(shared) => Ok(T::clone(&shared)),
                // a different but wire-compatible type: go through the encoding
                None => farwire::unpack(&value.encode()?),
            },
        }
    }

    /// The held value itself, when the payload never left the process.
    pub fn shared<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        match self {
            Payload::Value(value) => value.downcast::<T>(),
            Payload::Encoded(_) => None,
        }
    }

    pub fn is_encoded(&self) -> bool {
        matches!(self, Payload::Encoded(_))
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Encoded(bytes) => write!(f, "Encoded({} bytes)", bytes.len()),
            Payload::Value(_) => f.write_str("Value(..)"),
        }
    }
}

/// Reserved operation answered by every object: type check.
pub const IS_A_OPERATION: &str = "_is_a";
/// Reserved operation answered by every object: liveness check.
pub const PING_OPERATION: &str = "_ping";

/// One operation call as a generated stub describes it.
#[derive(Clone, Debug)]
pub struct Invocation {
    operation: String,
    args: Payload,
    idempotent: bool,
}

impl Invocation {
    pub fn new(operation: impl Into<String>, args: Payload) -> Self {
        Self { operation: operation.into(), args, idempotent: false }
    }

    /// Marks the operation as safe to execute more than once, which allows
    /// retrying it after ambiguous transport failures.
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    pub fn is_a(type_id: &str) -> Self {
        Self::new(IS_A_OPERATION, Payload::value(type_id.to_string())).idempotent()
    }

    pub fn ping() -> Self {
        Self::new(PING_OPERATION, Payload::empty()).idempotent()
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn args(&self) -> &Payload {
        &self.args
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }
}
