//! # Runtime
//!
//! Owner of everything proxies share: configuration, the emitter pool and the
//! registry of local object adapters. Runtimes are independent of each other;
//! proxies keep their runtime alive.

use std::sync::Arc;

use farwire::Endpoint;
use tracing::debug;

use crate::adapter;
use crate::adapter::AdapterRegistry;
use crate::adapter::ObjectAdapter;
use crate::config::Config;
use crate::emitter::EmitterPool;
use crate::factory::ProxyFactory;
use crate::proxy::ObjectPrx;
use crate::reference::Reference;
use crate::transport::Connector;

pub(crate) struct RuntimeInner {
    pub(crate) config: Config,
    pub(crate) pool: EmitterPool,
    pub(crate) adapters: AdapterRegistry,
}

/// A cheaply cloneable handle to one runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// A runtime with the default [`Config`].
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_config(connector, Config::default())
    }

    pub fn with_config(connector: Arc<dyn Connector>, config: Config) -> Self {
        debug!(?config, "runtime created");
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                pool: EmitterPool::new(connector),
                adapters: AdapterRegistry::new(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn proxy_factory(&self) -> ProxyFactory {
        ProxyFactory::new(Arc::clone(&self.inner))
    }

    /// Shorthand for `proxy_factory().create(reference)`.
    pub fn proxy(&self, reference: Reference) -> ObjectPrx {
        self.proxy_factory().create(reference)
    }

    /// Registers a new, inactive adapter. Proxies dispatch to it directly
    /// once it is activated.
    pub fn create_adapter(
        &self,
        name: impl Into<String>,
        endpoints: Vec<Endpoint>,
    ) -> adapter::Result<Arc<ObjectAdapter>> {
        let adapter = ObjectAdapter::new(name, endpoints);
        self.inner.adapters.insert(Arc::clone(&adapter))?;
        Ok(adapter)
    }

    pub fn adapter(&self, name: &str) -> Option<Arc<ObjectAdapter>> {
        self.inner.adapters.get(name)
    }

    /// Unregisters and deactivates an adapter. Proxies bound to it resolve
    /// again on their next call.
    pub fn remove_adapter(&self, name: &str) -> Option<Arc<ObjectAdapter>> {
        let adapter = self.inner.adapters.remove(name)?;
        adapter.deactivate();
        Some(adapter)
    }

    /// Open connections currently shared by marshaled delegates.
    pub fn live_emitters(&self) -> usize {
        self.inner.pool.live()
    }

    pub(crate) fn pool(&self) -> &EmitterPool {
        &self.inner.pool
    }
}
