//! # Proxies
//!
//! A proxy is a cheap, cloneable handle ([`ObjectPrx`]) around a shared
//! implementation object. The implementation owns the current [`Reference`]
//! and lazily binds a [`Delegate`] for it. Every call goes through one loop:
//!
//! 1. take the bound delegate, or resolve one (direct when a local adapter
//!    hosts the target, marshaled otherwise),
//! 2. invoke it,
//! 3. on a location-forward, rebind to the new target and go again,
//! 4. on a failure, let the call's [`RetryState`] decide between another
//!    attempt and surfacing the error.
//!
//! ## Invariants
//! - A bound delegate always matches the reference it was resolved for.
//! - A failing caller clears the binding only if it still holds the delegate
//!   that failed; a newer binding made by a concurrent caller survives.
//! - Mode mutators create new proxies and never touch the network.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;
use std::time::Duration;

use tracing::debug;
use tracing::warn;

use farwire::Mode;

use crate::adapter::OBJECT_TYPE_ID;
use crate::delegate::Delegate;
use crate::delegate::DirectDelegate;
use crate::delegate::Dispatched;
use crate::delegate::MarshaledDelegate;
use crate::emitter::Deadline;
use crate::emitter::EmitterKey;
use crate::error::Error;
use crate::error::Result;
use crate::factory::ProxyFactory;
use crate::payload::Invocation;
use crate::payload::Payload;
use crate::reference::Reference;
use crate::retry::RetryState;
use crate::retry::Verdict;
use crate::runtime::RuntimeInner;

struct Binding {
    reference: Reference,
    delegate: Option<Arc<Delegate>>,
}

pub(crate) struct ProxyImpl {
    runtime: Arc<RuntimeInner>,
    binding: Mutex<Binding>,
}

impl ProxyImpl {
    pub(crate) fn new(runtime: Arc<RuntimeInner>, reference: Reference) -> Self {
        Self {
            runtime,
            binding: Mutex::new(Binding { reference, delegate: None }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Binding> {
        // the slot holds plain values, so a poisoned guard is still consistent
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reference(&self) -> Reference {
        self.lock().reference.clone()
    }

    fn derive(&self, reference: Reference) -> ObjectPrx {
        ProxyFactory::new(Arc::clone(&self.runtime)).create(reference)
    }

    /// The bound delegate, resolving and binding one if needed.
    async fn delegate(&self, deadline: Option<Deadline>) -> Result<Arc<Delegate>> {
        let reference = {
            let binding = self.lock();
            if let Some(delegate) = &binding.delegate {
                return Ok(Arc::clone(delegate));
            }
            binding.reference.clone()
        };

        let resolved = Arc::new(self.resolve(&reference, deadline).await?);

        let mut binding = self.lock();
        if binding.reference != reference {
            // forwarded while we were connecting; use it for this attempt only
            return Ok(resolved);
        }
        match &binding.delegate {
            Some(existing) => Ok(Arc::clone(existing)),
            None => {
                binding.delegate = Some(Arc::clone(&resolved));
                Ok(resolved)
            }
        }
    }

    /// Chooses between direct and marshaled dispatch for `reference`.
    /// Connecting must finish by `deadline`, else by the configured connect
    /// timeout.
    async fn resolve(&self, reference: &Reference, deadline: Option<Deadline>) -> Result<Delegate> {
        let config = &self.runtime.config;

        let direct_mode = matches!(reference.mode(), Mode::Twoway | Mode::Oneway);
        if config.collocation() && reference.collocation_allowed() && direct_mode {
            if let Some(adapter) = self.runtime.adapters.find_collocated(reference) {
                debug!(%reference, adapter = %adapter.name(), "bound direct delegate");
                return Ok(Delegate::Direct(DirectDelegate::new(reference.clone(), &adapter)));
            }
        }

        let key = EmitterKey::for_reference(reference)?;
        let deadline = deadline.or_else(|| config.connect_timeout().map(Deadline::after));
        let emitter = self
            .runtime
            .pool
            .acquire(&key, deadline, config.endpoint_selection())
            .await?;

        debug!(%reference, endpoint = %emitter.endpoint(), "bound marshaled delegate");
        Ok(Delegate::Marshaled(MarshaledDelegate::new(
            reference.clone(),
            emitter,
            config.invocation_timeout(),
        )))
    }

    fn discard(&self, failed: &Arc<Delegate>) {
        let mut binding = self.lock();
        if binding.delegate.as_ref().is_some_and(|bound| Arc::ptr_eq(bound, failed)) {
            binding.delegate = None;
        }
    }

    /// Moves this proxy to the forward target. The caller's mode, security,
    /// timeout and collocation choices stay.
    fn follow(&self, target: &Reference) -> Result<()> {
        let mut binding = self.lock();
        let next = binding
            .reference
            .with_identity(target.identity())?
            .with_endpoints(target.endpoints().to_vec());
        debug!(from = %binding.reference, to = %next, "following location forward");
        binding.reference = next;
        binding.delegate = None;
        Ok(())
    }

    async fn dispatch(&self, invocation: &Invocation) -> Result<Payload> {
        let timeout = self
            .reference()
            .timeout_ms()
            .map(|ms| Duration::from_millis(u64::from(ms)));
        let mut retry = RetryState::new(&self.runtime.config, timeout);

        loop {
            let mut bound = None;
            let outcome = match self.delegate(retry.deadline()).await {
                Ok(delegate) => {
                    let outcome = delegate.invoke(invocation, retry.deadline()).await;
                    bound = Some(delegate);
                    outcome
                }
                Err(e) => Err(e),
            };

            let error = match outcome {
                Ok(Dispatched::Reply(payload)) => return Ok(payload),
                Ok(Dispatched::Forward(target)) => {
                    retry.on_forward()?;
                    self.follow(&target)?;
                    continue;
                }
                Err(error) => error,
            };

            if let (Some(delegate), Error::Transport(_)) = (&bound, &error) {
                self.discard(delegate);
            }

            match retry.on_failure(error, invocation.is_idempotent()) {
                Verdict::Retry => {
                    warn!(
                        operation = %invocation.operation(),
                        attempt = retry.attempts(),
                        "retrying after transport failure"
                    );
                    if !retry.interval().is_zero() {
                        tokio::time::sleep(retry.interval()).await;
                    }
                }
                Verdict::Fail(error) => return Err(error),
            }
        }
    }

    async fn flush(&self) -> Result<()> {
        let (reference, delegate) = {
            let binding = self.lock();
            (binding.reference.clone(), binding.delegate.clone())
        };
        if !reference.mode().is_batch() {
            return Ok(());
        }
        if let Some(delegate) = delegate {
            return delegate.flush().await;
        }

        // nothing bound yet: flush whatever a sibling proxy queued, never connect
        let Ok(key) = EmitterKey::for_reference(&reference) else {
            return Ok(());
        };
        if let Some(emitter) = self.runtime.pool.existing(&key) {
            emitter.flush_batch().await?;
        }
        Ok(())
    }

    fn is_bound_direct(&self) -> Option<bool> {
        self.lock().delegate.as_ref().map(|d| d.is_direct())
    }
}

/// Handle to a remote object of any type.
#[derive(Clone)]
pub struct ObjectPrx {
    inner: Arc<ProxyImpl>,
}

impl ObjectPrx {
    pub(crate) fn from_impl(inner: Arc<ProxyImpl>) -> Self {
        Self { inner }
    }

    /// The reference calls currently target.
    pub fn reference(&self) -> Reference {
        self.inner.reference()
    }

    pub fn identity(&self) -> String {
        self.inner.reference().identity().to_string()
    }

    /// Performs one operation. Calls that expect no reply return an empty
    /// payload once the request is sent, queued or dispatched.
    pub async fn invoke(&self, invocation: Invocation) -> Result<Payload> {
        self.inner.dispatch(&invocation).await
    }

    /// Asks the object whether it implements `type_id`. Requires a twoway
    /// proxy.
    pub async fn is_a(&self, type_id: &str) -> Result<bool> {
        let mode = self.inner.reference().mode();
        if mode != Mode::Twoway {
            return Err(Error::InvalidArgument(format!("is_a needs a twoway proxy, not {}", mode)));
        }
        let reply = self.invoke(Invocation::is_a(type_id)).await?;
        Ok(reply.decode::<bool>()?)
    }

    pub async fn ping(&self) -> Result<()> {
        self.invoke(Invocation::ping()).await.map(|_| ())
    }

    /// Sends requests queued by batch calls. A no-op that never connects for
    /// other modes.
    pub async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }

    /// `Some(true)` when calls are bound to a local adapter, `None` before the
    /// first call.
    pub fn is_collocated(&self) -> Option<bool> {
        self.inner.is_bound_direct()
    }

    fn derive(&self, change: impl FnOnce(&Reference) -> Reference) -> Self {
        self.inner.derive(change(&self.inner.reference()))
    }

    pub fn as_twoway(&self) -> Self {
        self.derive(|r| r.with_mode(Mode::Twoway))
    }

    pub fn as_oneway(&self) -> Self {
        self.derive(|r| r.with_mode(Mode::Oneway))
    }

    pub fn as_batch_oneway(&self) -> Self {
        self.derive(|r| r.with_mode(Mode::BatchOneway))
    }

    pub fn as_datagram(&self) -> Self {
        self.derive(|r| r.with_mode(Mode::Datagram))
    }

    pub fn as_batch_datagram(&self) -> Self {
        self.derive(|r| r.with_mode(Mode::BatchDatagram))
    }

    pub fn as_secure(&self, secure: bool) -> Self {
        self.derive(|r| r.with_secure(secure))
    }

    pub fn with_timeout(&self, timeout_ms: u32) -> Self {
        self.derive(|r| r.with_timeout(Some(timeout_ms)))
    }

    pub fn with_collocation(&self, allowed: bool) -> Self {
        self.derive(|r| r.with_collocation(allowed))
    }

    pub fn with_identity(&self, identity: &str) -> Result<Self> {
        let reference = self.inner.reference().with_identity(identity)?;
        Ok(self.inner.derive(reference))
    }

    pub fn downgrade(&self) -> WeakPrx {
        WeakPrx { inner: Arc::downgrade(&self.inner) }
    }

    /// Narrows to `P` after the object confirms it implements `P`.
    pub async fn checked_cast<P: Proxy>(&self) -> Result<Option<P>> {
        if self.is_a(P::TYPE_ID).await? {
            Ok(Some(P::from_object(self.clone())))
        } else {
            Ok(None)
        }
    }

    /// Narrows to `P` without asking the object.
    pub fn unchecked_cast<P: Proxy>(&self) -> P {
        P::from_object(self.clone())
    }
}

impl PartialEq for ObjectPrx {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.reference() == other.reference()
    }
}

impl Eq for ObjectPrx {}

impl std::hash::Hash for ObjectPrx {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.reference().hash(state);
    }
}

impl PartialOrd for ObjectPrx {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectPrx {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.reference().cmp(&other.reference())
    }
}

impl std::fmt::Display for ObjectPrx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reference())
    }
}

impl std::fmt::Debug for ObjectPrx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectPrx({})", self.reference())
    }
}

/// A handle that does not keep the proxy alive.
#[derive(Clone)]
pub struct WeakPrx {
    inner: Weak<ProxyImpl>,
}

impl WeakPrx {
    pub fn upgrade(&self) -> Option<ObjectPrx> {
        self.inner.upgrade().map(ObjectPrx::from_impl)
    }
}

impl std::fmt::Debug for WeakPrx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.upgrade() {
            Some(prx) => write!(f, "WeakPrx({})", prx.reference()),
            None => f.write_str("WeakPrx(<dropped>)"),
        }
    }
}

/// A typed proxy, as a generated stub defines it.
///
/// Implementors wrap an [`ObjectPrx`] and get the mode mutators for free.
pub trait Proxy: Sized + Clone + Send + Sync {
    /// Type id checked by [`ObjectPrx::checked_cast`].
    const TYPE_ID: &'static str;

    fn from_object(object: ObjectPrx) -> Self;

    fn as_object(&self) -> &ObjectPrx;

    fn reference(&self) -> Reference {
        self.as_object().reference()
    }

    fn as_twoway(&self) -> Self {
        Self::from_object(self.as_object().as_twoway())
    }

    fn as_oneway(&self) -> Self {
        Self::from_object(self.as_object().as_oneway())
    }

    fn as_batch_oneway(&self) -> Self {
        Self::from_object(self.as_object().as_batch_oneway())
    }

    fn as_datagram(&self) -> Self {
        Self::from_object(self.as_object().as_datagram())
    }

    fn as_batch_datagram(&self) -> Self {
        Self::from_object(self.as_object().as_batch_datagram())
    }

    fn as_secure(&self, secure: bool) -> Self {
        Self::from_object(self.as_object().as_secure(secure))
    }

    fn with_timeout(&self, timeout_ms: u32) -> Self {
        Self::from_object(self.as_object().with_timeout(timeout_ms))
    }

    fn with_collocation(&self, allowed: bool) -> Self {
        Self::from_object(self.as_object().with_collocation(allowed))
    }

    fn with_identity(&self, identity: &str) -> Result<Self> {
        self.as_object().with_identity(identity).map(Self::from_object)
    }
}

impl Proxy for ObjectPrx {
    const TYPE_ID: &'static str = OBJECT_TYPE_ID;

    fn from_object(object: ObjectPrx) -> Self {
        object
    }

    fn as_object(&self) -> &ObjectPrx {
        self
    }
}
