//! Retry policy: how many attempts a store call gets and how long to wait between them.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::domain::StoreError;

/// Retry policy for failed store calls.
///
/// Only `StoreError::Transient` failures are retried. Not-found, validation
/// and storage failures are returned on the first attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay_ms: u64,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for a single delay.
    pub max_delay_ms: u64,

    /// Random spread applied to each delay, as a fraction (0.1 = +/-10%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::reads()
    }
}

impl RetryPolicy {
    /// Reads: 3 attempts, 1s/2s backoff.
    pub fn reads() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter: 0.0,
        }
    }

    /// Mutations: 2 attempts.
    pub fn mutations() -> Self {
        Self {
            max_attempts: 2,
            ..Self::reads()
        }
    }

    /// Single attempt, no retries.
    pub fn never() -> Self {
        Self {
            max_attempts: 1,
            ..Self::reads()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Calculate delay before the retry that follows attempt number `attempts` (1-indexed).
    ///
    /// delay = base_delay * multiplier^(attempts - 1), capped at `max_delay_ms`.
    ///
    /// With base=1s, multiplier=2.0: 1s, 2s, 4s, ...
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay_ms as f64 / 1_000.0;
        let mut delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        if self.jitter > 0.0 {
            let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            delay_secs *= 1.0 + spread;
        }
        let cap_secs = self.max_delay_ms as f64 / 1_000.0;
        Duration::from_secs_f64(delay_secs.clamp(0.0, cap_secs))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `on_retry` sees each failure that is about to be retried.
    pub async fn run<T, F, Fut, R>(&self, mut op: F, mut on_retry: R) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
        R: FnMut(u32, &StoreError),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.next_delay(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Store call failed, retrying"
                    );
                    on_retry(attempt, &e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
