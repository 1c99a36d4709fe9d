//! # References
//!
//! An immutable description of an invocation target. Every "change" produces
//! a new reference with exactly one field replaced, so a reference can be
//! shared freely between proxies, delegates and emitter keys.

use std::sync::Arc;

use farwire::Endpoint;
use farwire::Mode;
use farwire::WireReference;

use crate::error::Error;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Target {
    identity: String,
    endpoints: Vec<Endpoint>,
    mode: Mode,
    secure: bool,
    timeout_ms: Option<u32>,
    collocation_allowed: bool,
}

/// Identity, endpoints and invocation flags of a remote object.
///
/// Equality, hashing and ordering are structural over all fields, in the
/// order: identity, endpoints, mode, secure, timeout, collocation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    target: Arc<Target>,
}

impl Reference {
    /// A twoway, insecure, collocation-allowed reference with no timeout.
    pub fn new(identity: impl Into<String>, endpoints: Vec<Endpoint>) -> Result<Self> {
        let identity = identity.into();
        check_identity(&identity)?;
        Ok(Self::from_target(Target {
            identity,
            endpoints,
            mode: Mode::Twoway,
            secure: false,
            timeout_ms: None,
            collocation_allowed: true,
        }))
    }

    fn from_target(target: Target) -> Self {
        Self { target: Arc::new(target) }
    }

    fn derive(&self, change: impl FnOnce(&mut Target)) -> Self {
        let mut target = Target::clone(&self.target);
        change(&mut target);
        Self::from_target(target)
    }

    pub fn identity(&self) -> &str {
        &self.target.identity
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.target.endpoints
    }

    pub fn mode(&self) -> Mode {
        self.target.mode
    }

    pub fn secure(&self) -> bool {
        self.target.secure
    }

    /// Milliseconds; `None` means the transport default.
    pub fn timeout_ms(&self) -> Option<u32> {
        self.target.timeout_ms
    }

    pub fn collocation_allowed(&self) -> bool {
        self.target.collocation_allowed
    }

    pub fn with_mode(&self, mode: Mode) -> Self {
        self.derive(|t| t.mode = mode)
    }

    pub fn with_secure(&self, secure: bool) -> Self {
        self.derive(|t| t.secure = secure)
    }

    pub fn with_timeout(&self, timeout_ms: Option<u32>) -> Self {
        self.derive(|t| t.timeout_ms = timeout_ms)
    }

    pub fn with_collocation(&self, allowed: bool) -> Self {
        self.derive(|t| t.collocation_allowed = allowed)
    }

    pub fn with_endpoints(&self, endpoints: Vec<Endpoint>) -> Self {
        self.derive(|t| t.endpoints = endpoints)
    }

    /// Fails with [`Error::InvalidArgument`] on an empty identity.
    pub fn with_identity(&self, identity: impl Into<String>) -> Result<Self> {
        let identity = identity.into();
        check_identity(&identity)?;
        Ok(self.derive(|t| t.identity = identity))
    }

    pub fn to_wire(&self) -> WireReference {
        WireReference {
            identity: self.target.identity.clone(),
            endpoints: self.target.endpoints.clone(),
            mode: self.target.mode,
            secure: self.target.secure,
            timeout_ms: self.target.timeout_ms,
            collocation_allowed: self.target.collocation_allowed,
        }
    }

    pub fn from_wire(wire: WireReference) -> Result<Self> {
        check_identity(&wire.identity)?;
        Ok(Self::from_target(Target {
            identity: wire.identity,
            endpoints: wire.endpoints,
            mode: wire.mode,
            secure: wire.secure,
            timeout_ms: wire.timeout_ms,
            collocation_allowed: wire.collocation_allowed,
        }))
    }
}

fn check_identity(identity: &str) -> Result<()> {
    if identity.is_empty() {
        return Err(Error::InvalidArgument("identity must not be empty".into()));
    }
    Ok(())
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -{}", self.target.identity, self.target.mode)?;
        if self.target.secure {
            f.write_str(" -secure")?;
        }
        if let Some(ms) = self.target.timeout_ms {
            write!(f, " -t {}", ms)?;
        }
        for endpoint in &self.target.endpoints {
            write!(f, " @ {}", endpoint)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Reference({})", self)
    }
}
