//! Bounded retry with exponential backoff around a single fetch.

use crate::transport::{Transport, TransportError};
use std::time::Duration;

/// Attempt budget and backoff schedule. Stateless across fetches.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    attempts: u32,
    backoff_factor: f64,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_ATTEMPTS: u32 = 31;
    pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);

    /// `attempts` counts every try, the first one included. Zero is treated
    /// as one.
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff_factor: 1.0,
            max_backoff: Self::DEFAULT_MAX_BACKOFF,
        }
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor.max(0.0);
        self
    }

    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = max;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the 1-based `attempt`.
    ///
    /// Nothing before the first retry; after that `factor * 2^(attempt - 2)`
    /// seconds, capped at the maximum.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 2 || self.backoff_factor == 0.0 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(62) as i32;
        let secs = self.backoff_factor * 2f64.powi(exp);
        if secs >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// Every attempt is logged before it is made.
    pub fn run<T>(
        &self,
        url: &str,
        mut op: impl FnMut() -> Result<T, TransportError>,
    ) -> Result<T, FetchError> {
        let mut attempt = 1;
        loop {
            let delay = self.backoff(attempt);
            if !delay.is_zero() {
                tracing::debug!(delay_ms = delay.as_millis() as u64, "backing off");
                std::thread::sleep(delay);
            }

            tracing::debug!(attempt, max = self.attempts, url, "Trying to connect to URL");
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => {
                    return Err(FetchError::Permanent {
                        url: url.to_string(),
                        source: err,
                    });
                }
                Err(err) if attempt >= self.attempts => {
                    tracing::error!(attempt, error = %err, "retry budget exhausted");
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "transient failure, retrying");
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS)
    }
}

/// Terminal fetch failure. No partial or cached body is substituted.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetching {url} failed after {attempts} attempts: {source}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("fetching {url} failed: {source}")]
    Permanent {
        url: String,
        #[source]
        source: TransportError,
    },
}

/// A transport wrapped in a retry policy.
pub struct Fetcher {
    transport: Box<dyn Transport>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: impl Transport + 'static, policy: RetryPolicy) -> Self {
        Self {
            transport: Box::new(transport),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.policy.run(url, || self.transport.get(url))
    }
}
