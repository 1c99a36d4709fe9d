//! # Delegates
//!
//! The strategy a proxy binds to perform calls. A [`Delegate`] is created for
//! exactly one [`Reference`] and never changes it; when the target moves the
//! proxy drops the delegate and resolves a new one.
//!
//! - [`MarshaledDelegate`] encodes the call and sends it through a shared
//!   [`Emitter`].
//! - [`DirectDelegate`] calls a servant of a local [`ObjectAdapter`] in the
//!   caller's task, passing argument and result values through untouched.

use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use tracing::trace;

use farwire::Mode;
use farwire::ReplyStatus;
use farwire::RequestFrame;

use crate::adapter::DispatchError;
use crate::adapter::DispatchResult;
use crate::adapter::ObjectAdapter;
use crate::emitter::Deadline;
use crate::emitter::Emitter;
use crate::error::Error;
use crate::error::FailureKind;
use crate::error::Result;
use crate::error::TransportFailure;
use crate::payload::Invocation;
use crate::payload::Payload;
use crate::reference::Reference;

/// How a delegate call ended when it did not fail.
#[derive(Debug, Clone)]
pub enum Dispatched {
    /// Results, or an empty payload for calls that expect none.
    Reply(Payload),
    /// The object lives at this reference instead.
    Forward(Reference),
}

pub enum Delegate {
    Marshaled(MarshaledDelegate),
    Direct(DirectDelegate),
}

impl Delegate {
    pub fn reference(&self) -> &Reference {
        match self {
            Delegate::Marshaled(d) => &d.reference,
            Delegate::Direct(d) => &d.reference,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Delegate::Direct(_))
    }

    /// Performs one attempt. `deadline` bounds a twoway wait; direct calls
    /// run to completion.
    pub async fn invoke(&self, invocation: &Invocation, deadline: Option<Deadline>) -> Result<Dispatched> {
        match self {
            Delegate::Marshaled(d) => d.invoke(invocation, deadline).await,
            Delegate::Direct(d) => d.invoke(invocation).await,
        }
    }

    /// Sends queued batch requests. Does nothing outside batch modes.
    pub async fn flush(&self) -> Result<()> {
        match self {
            Delegate::Marshaled(d) => d.flush().await,
            Delegate::Direct(_) => Ok(()),
        }
    }
}

impl std::fmt::Debug for Delegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delegate::Marshaled(d) => write!(f, "Marshaled({} via {})", d.reference, d.emitter.endpoint()),
            Delegate::Direct(d) => write!(f, "Direct({})", d.reference),
        }
    }
}

pub struct MarshaledDelegate {
    reference: Reference,
    emitter: Arc<Emitter>,
    invocation_timeout: Option<Duration>,
}

impl MarshaledDelegate {
    /// `default_timeout` bounds twoway waits made without a call deadline.
    pub fn new(reference: Reference, emitter: Arc<Emitter>, default_timeout: Option<Duration>) -> Self {
        Self { reference, emitter, invocation_timeout: default_timeout }
    }

    pub fn emitter(&self) -> &Arc<Emitter> {
        &self.emitter
    }

    async fn invoke(&self, invocation: &Invocation, deadline: Option<Deadline>) -> Result<Dispatched> {
        let mode = self.reference.mode();
        let args = invocation.args().clone().into_bytes()?;
        let frame = RequestFrame::new(self.reference.identity(), invocation.operation(), mode, args)
            .idempotent(invocation.is_idempotent());

        match mode {
            Mode::Twoway => {
                let deadline = deadline.or_else(|| self.invocation_timeout.map(Deadline::after));
                let status = self.emitter.request(frame, deadline).await?;
                self.interpret(invocation, status)
            }
            Mode::Oneway | Mode::Datagram => {
                self.emitter.send_oneway(frame).await?;
                Ok(Dispatched::Reply(Payload::empty()))
            }
            Mode::BatchOneway | Mode::BatchDatagram => {
                self.emitter.enqueue(frame).await?;
                Ok(Dispatched::Reply(Payload::empty()))
            }
        }
    }

    fn interpret(&self, invocation: &Invocation, status: ReplyStatus) -> Result<Dispatched> {
        match status {
            ReplyStatus::Ok(bytes) => Ok(Dispatched::Reply(Payload::Encoded(bytes))),
            ReplyStatus::UserException(bytes) => Err(Error::Remote(Payload::Encoded(bytes))),
            ReplyStatus::ObjectNotExist => Err(self.object_not_found()),
            ReplyStatus::OperationNotExist => Err(Error::OperationNotFound {
                identity: self.reference.identity().to_string(),
                operation: invocation.operation().to_string(),
            }),
            ReplyStatus::LocationForward(wire) => match Reference::from_wire(wire) {
                Ok(target) => Ok(Dispatched::Forward(target)),
                Err(_) => Err(self.object_not_found()),
            },
            ReplyStatus::Unknown(msg) => Err(Error::Unknown(msg)),
        }
    }

    fn object_not_found(&self) -> Error {
        Error::ObjectNotFound { identity: self.reference.identity().to_string() }
    }

    async fn flush(&self) -> Result<()> {
        if self.reference.mode().is_batch() {
            self.emitter.flush_batch().await?;
        }
        Ok(())
    }
}

pub struct DirectDelegate {
    reference: Reference,
    adapter: Weak<ObjectAdapter>,
}

impl DirectDelegate {
    pub fn new(reference: Reference, adapter: &Arc<ObjectAdapter>) -> Self {
        Self { reference, adapter: Arc::downgrade(adapter) }
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<Dispatched> {
        // nothing was dispatched, so the caller may safely resolve again
        let adapter = self.adapter.upgrade().filter(|a| a.is_active()).ok_or_else(|| {
            Error::Transport(TransportFailure::new(
                FailureKind::NotSent,
                format!("local adapter for {} is gone", self.reference.identity()),
            ))
        })?;

        let mode = self.reference.mode();
        trace!(adapter = %adapter.name(), identity = %self.reference.identity(), operation = %invocation.operation(), "direct dispatch");
        let result = adapter
            .dispatch(self.reference.identity(), invocation.operation(), mode, invocation.args().clone(), true)
            .await;

        if mode == Mode::Oneway {
            return Ok(Dispatched::Reply(Payload::empty()));
        }
        self.interpret(invocation, result)
    }

    fn interpret(&self, invocation: &Invocation, result: DispatchResult) -> Result<Dispatched> {
        match result {
            Ok(payload) => Ok(Dispatched::Reply(payload)),
            Err(DispatchError::User(payload)) => Err(Error::Remote(payload)),
            Err(DispatchError::ObjectNotExist) => Err(Error::ObjectNotFound {
                identity: self.reference.identity().to_string(),
            }),
            Err(DispatchError::OperationNotExist) => Err(Error::OperationNotFound {
                identity: self.reference.identity().to_string(),
                operation: invocation.operation().to_string(),
            }),
            Err(DispatchError::LocationForward(target)) => Ok(Dispatched::Forward(target)),
            Err(DispatchError::Unknown(msg)) => Err(Error::Unknown(msg)),
        }
    }
}
