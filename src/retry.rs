//! Retry controller with exponential backoff.
//!
//! Wraps a fallible async operation and retries it while its failures are
//! retryable. All counters and timers are local to one call; the parameters
//! arrive explicitly as a [`RetryConfig`].
//!
//! # Backoff Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
//! ```
//!
//! - Retryable failure: sleep `delay`, then try again, up to `max_attempts`.
//! - Terminal failure: stop at once and hand the error back unchanged.
//! - Retryable failures on every attempt: [`RetryError::Exhausted`], which
//!   callers turn into an "unavailable" result instead of aborting.

use crate::config::RetryConfig;
use crate::error::{ErrorKind, PipelineError};
use rand::{Rng, rng};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};

/// A successful value together with the number of attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetryError {
    #[error("terminal failure on attempt {attempts}: {source}")]
    Terminal { source: PipelineError, attempts: u32 },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { last: PipelineError, attempts: u32 },
}

impl RetryError {
    /// The underlying failure (the last one, for exhausted retries).
    pub fn error(&self) -> &PipelineError {
        match self {
            RetryError::Terminal { source, .. } => source,
            RetryError::Exhausted { last, .. } => last,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Terminal { attempts, .. } | RetryError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error().kind()
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

pub struct RetryController {
    config: RetryConfig,
}

impl fmt::Debug for RetryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryController")
            .field("max_attempts", &self.config.max_attempts)
            .field("base_delay", &self.config.base_delay())
            .field("max_delay", &self.config.max_delay())
            .finish()
    }
}

impl RetryController {
    /// Build a controller from validated retry settings.
    ///
    /// # Arguments
    /// * `config` - Attempt budget and backoff bounds; see [`RetryConfig`].
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based), without jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.config.base_delay().saturating_mul(1u32 << exp);
        delay.min(self.config.max_delay())
    }

    fn jitter(&self) -> Duration {
        if self.config.jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng().random_range(0..=self.config.jitter_ms))
    }

    /// Run `operation` until it succeeds, fails terminally, or runs out of attempts.
    ///
    /// The operation receives the 1-based attempt number.
    #[instrument(level = "debug", skip_all, fields(max_attempts = self.config.max_attempts))]
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<Retried<T>, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let total_t0 = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let attempt_t0 = Instant::now();
            match operation(attempt).await {
                Ok(value) => {
                    debug!(attempt, "Operation succeeded");
                    return Ok(Retried {
                        value,
                        attempts: attempt,
                    });
                }
                Err(e) if !e.is_retryable() => {
                    warn!(attempt, error = %e, "Terminal failure; not retrying");
                    return Err(RetryError::Terminal {
                        source: e,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    let elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64;
                    let elapsed_ms_total = total_t0.elapsed().as_millis() as u64;

                    if attempt >= max_attempts {
                        warn!(
                            attempt,
                            max = max_attempts,
                            elapsed_ms_attempt,
                            elapsed_ms_total,
                            error = %e,
                            "Exhausted retries"
                        );
                        return Err(RetryError::Exhausted {
                            last: e,
                            attempts: attempt,
                        });
                    }

                    let delay = self.backoff_delay(attempt) + self.jitter();
                    warn!(
                        attempt,
                        max = max_attempts,
                        elapsed_ms_attempt,
                        elapsed_ms_total,
                        ?delay,
                        error = %e,
                        "Attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
