//! # Runtime Configuration
//!
//! Policy knobs shared by every proxy created from one [`Runtime`](crate::Runtime).

use std::time::Duration;

/// Order in which an emitter tries a reference's endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EndpointSelection {
    /// Shuffle on every connection attempt to spread load.
    #[default]
    Random,
    /// Always try endpoints in the order the reference lists them.
    Ordered,
}

/// Invocation policy.
///
/// | setting | default |
/// |---|---|
/// | `max_retries` | 1 |
/// | `retry_interval` | zero |
/// | `max_forwards` | 5 |
/// | `connect_timeout` | none (call deadline, else unbounded) |
/// | `invocation_timeout` | none (call deadline, else unbounded) |
///
/// A reference timeout is a deadline for the whole call and takes precedence
/// over both timeouts, which bound a single attempt.
/// | `endpoint_selection` | random |
/// | `collocation` | enabled |
#[derive(Debug, Clone)]
pub struct Config {
    max_retries: u32,
    retry_interval: Duration,
    max_forwards: u32,
    connect_timeout: Option<Duration>,
    invocation_timeout: Option<Duration>,
    endpoint_selection: EndpointSelection,
    collocation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: 1,
            retry_interval: Duration::ZERO,
            max_forwards: 5,
            connect_timeout: None,
            invocation_timeout: None,
            endpoint_selection: EndpointSelection::Random,
            collocation: true,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Transparent retries allowed per call after retryable failures.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Pause before each retry.
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Location-forwards followed per call before giving up.
    pub fn max_forwards(&self) -> u32 {
        self.max_forwards
    }

    /// Bound on establishing one connection, across all endpoints, when the
    /// reference sets no timeout.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Bound on a twoway wait when the reference sets no timeout.
    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.invocation_timeout
    }

    pub fn endpoint_selection(&self) -> EndpointSelection {
        self.endpoint_selection
    }

    /// Global switch for direct dispatch to local adapters.
    pub fn collocation(&self) -> bool {
        self.collocation
    }
}

/// Fluent builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval = interval;
        self
    }

    pub fn max_forwards(mut self, forwards: u32) -> Self {
        self.config.max_forwards = forwards;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.config.invocation_timeout = Some(timeout);
        self
    }

    pub fn endpoint_selection(mut self, selection: EndpointSelection) -> Self {
        self.config.endpoint_selection = selection;
        self
    }

    pub fn collocation(mut self, enabled: bool) -> Self {
        self.config.collocation = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
