//! # Retry and Redirect
//!
//! Call-scoped bookkeeping for one proxy operation. The proxy asks a
//! [`RetryState`] what to do after every failed attempt and every
//! location-forward; the state never outlives the call.
//!
//! A failure is retried only if repeating the request cannot execute it
//! twice on the server, unless the caller marked it idempotent:
//!
//! | failure | retried |
//! |---|---|
//! | connect failed or timed out, not sent, closed by peer | always, until the call deadline |
//! | send failed, connection lost | idempotent calls only |
//! | everything else | never |
//!
//! A reference timeout is one [`Deadline`] for the whole call: connecting,
//! waiting and every retry share it, and nothing is retried once it passed.

use std::time::Duration;

use crate::config::Config;
use crate::emitter::Deadline;
use crate::error::Error;
use crate::error::FailureKind;
use crate::error::Result;
use crate::error::TransportFailure;

/// What the proxy does after a failed attempt.
#[derive(Debug)]
pub enum Verdict {
    /// Drop the delegate, resolve again and repeat the call.
    Retry,
    /// Surface this error to the caller.
    Fail(Error),
}

#[derive(Debug, Clone)]
pub struct RetryState {
    attempts: u32,
    forwards: u32,
    max_retries: u32,
    max_forwards: u32,
    interval: Duration,
    deadline: Option<Deadline>,
}

impl RetryState {
    /// Starts the call's clock when `timeout` is set.
    pub fn new(config: &Config, timeout: Option<Duration>) -> Self {
        Self {
            attempts: 0,
            forwards: 0,
            max_retries: config.max_retries(),
            max_forwards: config.max_forwards(),
            interval: config.retry_interval(),
            deadline: timeout.map(Deadline::after),
        }
    }

    pub fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    /// Retries consumed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn forwards(&self) -> u32 {
        self.forwards
    }

    /// Pause before the next retry.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Counts a location-forward. Forwards never use up retries.
    pub fn on_forward(&mut self) -> Result<()> {
        self.forwards += 1;
        if self.forwards > self.max_forwards {
            return Err(Error::Transport(TransportFailure::new(
                FailureKind::ForwardLimit,
                format!("followed {} forwards", self.max_forwards),
            )));
        }
        Ok(())
    }

    pub fn on_failure(&mut self, error: Error, idempotent: bool) -> Verdict {
        let expired = self.deadline.is_some_and(|d| d.has_passed());
        if expired || !is_retryable(&error, idempotent) || self.attempts >= self.max_retries {
            return Verdict::Fail(error);
        }
        self.attempts += 1;
        Verdict::Retry
    }
}

/// Whether repeating the call after `error` is safe.
pub fn is_retryable(error: &Error, idempotent: bool) -> bool {
    match error.failure_kind() {
        Some(kind) if kind.never_sent() => true,
        Some(kind) if kind.is_ambiguous() => idempotent,
        _ => false,
    }
}
