// src/retry.rs

use crate::config::PoolConfig;
use crate::pool::KeyPool;
use secrecy::{ExposeSecret, Secret};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Terminal outcome of a retried call, generic over the operation's own error
/// type.
///
/// Both variants belong to the retryable service-unavailable class at the
/// boundary this crate serves: the pool may recover once a cooldown expires,
/// so a hosting request handler should map them to a response distinguishable
/// from a client input error.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Selection found no eligible key; the call was aborted without invoking
    /// the operation (retrying cannot make a key eligible sooner).
    #[error("no eligible API keys available")]
    NoEligibleKeys,

    /// The retry budget was spent without a success; wraps the last attempt's
    /// error.
    #[error("all {attempts} attempts failed: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    /// The last operation error, when any attempt ran at all.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::NoEligibleKeys => None,
            Self::Exhausted { last, .. } => Some(last),
        }
    }
}

/// Drives a caller-supplied operation across the keys of one pool.
///
/// Each logical call selects a key, invokes the operation, reports the
/// outcome back to the pool, and on failure waits a fixed delay before trying
/// again with whatever key the pool hands out next, up to the retry budget.
pub struct Retrier {
    pool: Arc<KeyPool>,
    attempts: u32,
    delay: Duration,
}

impl Retrier {
    /// `attempts` is clamped to at least 1.
    pub fn new(pool: Arc<KeyPool>, attempts: u32, delay: Duration) -> Self {
        Self {
            pool,
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Builds a retrier with the budget and delay from the pool's config.
    pub fn from_config(pool: Arc<KeyPool>, config: &PoolConfig) -> Self {
        Self::new(pool, config.attempts, config.retry_delay())
    }

    pub fn pool(&self) -> &Arc<KeyPool> {
        &self.pool
    }

    /// Runs `op` until it succeeds or the budget is spent.
    ///
    /// The operation receives the selected key and owns its own transport,
    /// timeouts, and cancellation; the retrier only reacts to the returned
    /// `Result`. No pool lock is held while `op` runs, so a slow downstream
    /// call never serializes unrelated requests.
    ///
    /// The inter-attempt delay is a fixed non-blocking sleep, deliberately not
    /// exponential backoff. A just-failed key that is still below its failure
    /// threshold may be re-selected on the next attempt; distinct keys per
    /// attempt fall out of strategy semantics, not an explicit exclusion.
    pub async fn run<F, Fut, T, E>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: Fn(Secret<String>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last_err = None;

        for attempt in 1..=self.attempts {
            let key = match self.pool.select() {
                Ok(key) => key,
                Err(err) => {
                    debug!(
                        pool = %self.pool.name(),
                        attempt,
                        error = %err,
                        "Aborting retried call: no key to try"
                    );
                    return Err(RetryError::NoEligibleKeys);
                }
            };

            match op(key.clone()).await {
                Ok(value) => {
                    self.pool.report_success(key.expose_secret());
                    debug!(pool = %self.pool.name(), attempt, "Retried call succeeded");
                    return Ok(value);
                }
                Err(err) => {
                    self.pool.report_failure(key.expose_secret());
                    warn!(
                        pool = %self.pool.name(),
                        attempt,
                        budget = self.attempts,
                        error = %err,
                        "Attempt failed"
                    );
                    last_err = Some(err);
                    if attempt < self.attempts {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        // The budget is at least 1 and a successful attempt returns early, so
        // at least one error was recorded by the time we get here.
        match last_err {
            Some(last) => Err(RetryError::Exhausted {
                attempts: self.attempts,
                last,
            }),
            None => Err(RetryError::NoEligibleKeys),
        }
    }
}
