// Shared transport configuration for building reqwest::Client instances.
//
// The card's web server is slow and flaky: short per-request timeouts keep
// cancellation latency bounded, and a small retry budget with exponential
// backoff absorbs the dropped connections it produces while busy.

use std::time::Duration;

use crate::error::Error;

/// Default per-request timeout for listing fetches.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry budget applied to the request phase of every GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each subsequent one.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_base: Duration::ZERO,
        }
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1 << exp)
    }

    /// Whether `err`, observed after `retries_done` retries, warrants another try.
    pub fn should_retry(&self, err: &Error, retries_done: u32) -> bool {
        retries_done < self.max_retries && err.is_transient()
    }
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout for listing requests and for connection establishment.
    pub timeout: Duration,
    /// Upper bound on the wait for any single chunk of a download body.
    pub chunk_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            chunk_timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// No client-wide total timeout is set: downloads can legitimately take
    /// minutes, so listing requests apply `timeout` per request instead and
    /// downloads bound each chunk with `chunk_timeout`.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .connect_timeout(self.timeout)
            .user_agent(concat!("ezsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Client(e.to_string()))
    }
}
