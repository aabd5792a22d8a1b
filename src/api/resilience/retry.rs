//! Bounded polling with a fixed delay
//!
//! Used to wait for eventually-consistent state: service provisioning, policy propagation,
//! subscription activation and deletion, secret availability.

use log::{debug, info, warn};
use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::{E2eError, Result};

/// Attempt budget and fixed inter-attempt delay for one call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryConfig {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    pub const fn secs(max_attempts: u32, delay_secs: u64) -> Self {
        Self::new(max_attempts, Duration::from_secs(delay_secs))
    }

    /// Same attempt count, no waiting in between
    pub const fn immediate(self) -> Self {
        Self::new(self.max_attempts, Duration::ZERO)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::secs(3, 1)
    }
}

/// Outcome of one polling attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    /// Not there yet; the reason is reported if the budget runs out
    Pending(String),
}

impl<T> Poll<T> {
    /// Treats any error as "not yet ready" so it only costs one attempt
    pub fn pending_on_error(result: Result<T>) -> Result<Poll<T>> {
        Ok(match result {
            Ok(value) => Poll::Ready(value),
            Err(e) => Poll::Pending(e.to_string()),
        })
    }

    /// Treats HTTP status mismatches as "not yet ready"; other errors abort the poll
    pub fn pending_on_status(result: Result<T>) -> Result<Poll<T>> {
        match result {
            Ok(value) => Ok(Poll::Ready(value)),
            Err(e) => Self::retry_on_status(e),
        }
    }

    /// A status mismatch costs one attempt; any other error is returned as is
    pub fn retry_on_status(error: E2eError) -> Result<Poll<T>> {
        if error.is_unexpected_status() {
            Ok(Poll::Pending(error.to_string()))
        } else {
            Err(error)
        }
    }
}

/// Types of transport errors and their retry behavior
#[derive(Debug, Clone, PartialEq)]
pub enum RetryableError {
    /// Network-level errors (connection refused, DNS, etc)
    Network,
    /// Request or connect timeout
    Timeout,
    /// Everything else
    Permanent,
}

impl RetryableError {
    pub fn should_retry(&self) -> bool {
        match self {
            RetryableError::Network => true,
            RetryableError::Timeout => true,
            RetryableError::Permanent => false,
        }
    }

    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            RetryableError::Timeout
        } else if error.is_connect() {
            RetryableError::Network
        } else {
            RetryableError::Permanent
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Repeats `attempt` until it is ready or the attempt budget is exhausted.
    ///
    /// `Ok(Poll::Pending)` costs one attempt. `Err` ends the poll immediately with that
    /// error. Exhaustion yields [`E2eError::PollTimeout`] with the last pending reason.
    pub async fn poll<F, Fut, T>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Poll<T>>>,
    {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut last = String::from("no attempt made");

        for n in 1..=max_attempts {
            debug!("{}: attempt {}/{}", operation, n, max_attempts);
            match attempt().await? {
                Poll::Ready(value) => {
                    if n > 1 {
                        info!(
                            "{} succeeded after {} attempts ({:.2}s)",
                            operation,
                            n,
                            started.elapsed().as_secs_f64()
                        );
                    }
                    return Ok(value);
                }
                Poll::Pending(reason) => {
                    if n < max_attempts {
                        warn!(
                            "{} not ready on attempt {}/{}: {} - retrying in {:?}",
                            operation, n, max_attempts, reason, self.config.delay
                        );
                        tokio::time::sleep(self.config.delay).await;
                    }
                    last = reason;
                }
            }
        }

        Err(E2eError::PollTimeout {
            operation: operation.to_string(),
            attempts: max_attempts,
            elapsed: started.elapsed(),
            last,
        })
    }

    /// Retries `operation` on connection-level failures only
    pub async fn retry_transport<F, Fut, T>(&self, what: &str, mut operation: F) -> std::result::Result<T, reqwest::Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, reqwest::Error>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut n = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let retry = RetryableError::from_reqwest_error(&error).should_retry();
                    if !retry || n >= max_attempts {
                        return Err(error);
                    }
                    warn!("{} failed on attempt {} (retryable): {}", what, n, error);
                    tokio::time::sleep(self.config.delay).await;
                    n += 1;
                }
            }
        }
    }
}
