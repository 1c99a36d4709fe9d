//! Shared fixtures: a `Printer` servant, its typed proxy, and an in-memory
//! "remote" server.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use farcall::Config;
use farcall::Current;
use farcall::DispatchError;
use farcall::DispatchResult;
use farcall::Endpoint;
use farcall::Invocation;
use farcall::ObjectAdapter;
use farcall::ObjectPrx;
use farcall::Payload;
use farcall::Proxy;
use farcall::Reference;
use farcall::Runtime;
use farcall::Servant;
use farcall::memory::MemoryConnector;
use farcall::payload::Value;

pub const PRINTER_TYPE_ID: &str = "::Demo::Printer";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub lines: Vec<String>,
}

/// Prints by remembering.
#[derive(Default)]
pub struct Printer {
    printed: Mutex<Vec<String>>,
    rendered: Mutex<Vec<Arc<Page>>>,
}

impl Printer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn printed(&self) -> Vec<String> {
        self.printed.lock().unwrap().clone()
    }

    pub fn rendered(&self) -> Vec<Arc<Page>> {
        self.rendered.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Servant for Printer {
    fn type_ids(&self) -> &[&'static str] {
        &[PRINTER_TYPE_ID]
    }

    async fn dispatch(&self, current: &Current, args: Payload) -> DispatchResult {
        let text = || {
            args.decode::<String>()
                .map_err(|e| DispatchError::Unknown(e.to_string()))
        };
        match current.operation.as_str() {
            "printString" => {
                self.printed.lock().unwrap().push(text()?);
                Ok(Payload::empty())
            }
            "render" => {
                let page = Arc::new(Page { lines: text()?.lines().map(str::to_string).collect() });
                self.rendered.lock().unwrap().push(Arc::clone(&page));
                Ok(Payload::Value(Value::from_arc(page)))
            }
            "printedCount" => Ok(Payload::value(self.printed.lock().unwrap().len() as u32)),
            "jam" => Err(DispatchError::User(Payload::value("paper jam".to_string()))),
            _ => Err(DispatchError::OperationNotExist),
        }
    }
}

/// Typed proxy for [`Printer`], as a stub generator would write it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrinterPrx(ObjectPrx);

impl Proxy for PrinterPrx {
    const TYPE_ID: &'static str = PRINTER_TYPE_ID;

    fn from_object(object: ObjectPrx) -> Self {
        Self(object)
    }

    fn as_object(&self) -> &ObjectPrx {
        &self.0
    }
}

impl PrinterPrx {
    pub async fn print_string(&self, text: &str) -> farcall::Result<()> {
        let call = Invocation::new("printString", Payload::value(text.to_string()));
        self.0.invoke(call).await.map(|_| ())
    }

    pub async fn render(&self, text: &str) -> farcall::Result<Arc<Page>> {
        let reply = self
            .0
            .invoke(Invocation::new("render", Payload::value(text.to_string())))
            .await?;
        match reply.shared::<Page>() {
            Some(page) => Ok(page),
            None => Ok(Arc::new(reply.decode()?)),
        }
    }

    pub async fn printed_count(&self) -> farcall::Result<u32> {
        let reply = self
            .0
            .invoke(Invocation::new("printedCount", Payload::empty()).idempotent())
            .await?;
        Ok(reply.decode()?)
    }

    pub async fn jam(&self) -> farcall::Result<()> {
        self.0.invoke(Invocation::new("jam", Payload::empty())).await.map(|_| ())
    }

    pub async fn ping(&self) -> farcall::Result<()> {
        self.0.ping().await
    }

    pub async fn flush(&self) -> farcall::Result<()> {
        self.0.flush().await
    }
}

/// A client runtime and an in-memory server hosting a [`Printer`] at
/// `mem:printer`.
pub struct World {
    pub runtime: Runtime,
    pub connector: MemoryConnector,
    pub server: Arc<ObjectAdapter>,
    pub printer: Arc<Printer>,
    pub endpoint: Endpoint,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        init_tracing();
        let endpoint = Endpoint::mem("printer");
        let connector = MemoryConnector::new();

        let printer = Printer::new();
        let server = ObjectAdapter::new("server", vec![endpoint.clone()]);
        server.add("Printer", printer.clone()).unwrap();
        server.activate();
        connector.serve(Arc::clone(&server));

        let runtime = Runtime::with_config(Arc::new(connector.clone()), config);
        Self { runtime, connector, server, printer, endpoint }
    }

    pub fn reference(&self) -> Reference {
        Reference::new("Printer", vec![self.endpoint.clone()]).unwrap()
    }

    pub fn printer_prx(&self) -> PrinterPrx {
        self.runtime.proxy(self.reference()).unchecked_cast()
    }

    /// Hosts another adapter on the same in-memory network.
    pub fn serve(&self, name: &str, endpoint: Endpoint) -> Arc<ObjectAdapter> {
        let adapter = ObjectAdapter::new(name, vec![endpoint]);
        adapter.activate();
        self.connector.serve(Arc::clone(&adapter));
        adapter
    }
}
