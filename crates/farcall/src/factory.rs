//! The only place proxy implementations are built.

use std::sync::Arc;

use tracing::trace;

use crate::proxy::ObjectPrx;
use crate::proxy::ProxyImpl;
use crate::reference::Reference;
use crate::runtime::RuntimeInner;

/// Creates proxies bound to one runtime.
#[derive(Clone)]
pub struct ProxyFactory {
    runtime: Arc<RuntimeInner>,
}

impl ProxyFactory {
    pub(crate) fn new(runtime: Arc<RuntimeInner>) -> Self {
        Self { runtime }
    }

    /// A fresh, unbound proxy for exactly `reference`. Equal references still
    /// yield independent proxies.
    pub fn create(&self, reference: Reference) -> ObjectPrx {
        trace!(%reference, "creating proxy");
        ObjectPrx::from_impl(Arc::new(ProxyImpl::new(Arc::clone(&self.runtime), reference)))
    }
}
