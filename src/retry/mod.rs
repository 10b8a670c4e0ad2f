// Retry and pacing policy shared by the pipelines
// Sleeping goes through `Sleeper` so tests can observe delays without waiting


use async_trait::async_trait;
use std::future::Future;
#[cfg(test)]
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::http::ServiceError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Exponential backoff for transient failures
///
/// The delay before retry `k` (1-based) is `base_delay * 2^(k-1)`, clamped to
/// `max_delay` when set. `max_total_delay` bounds the cumulative time spent
/// sleeping across one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Option<Duration>,
    pub max_total_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: None,
            max_total_delay: None,
        }
    }
}

impl RetryPolicy {
    #[inline]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    #[inline]
    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    #[inline]
    pub fn with_max_total_delay(mut self, max_total_delay: Option<Duration>) -> Self {
        self.max_total_delay = max_total_delay;
        self
    }

    /// Delay slept before the given retry (1 = first retry)
    #[inline]
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1_u32 << exponent);
        match self.max_delay {
            Some(ceiling) => delay.min(ceiling),
            None => delay,
        }
    }
}

/// Suspension point used for backoff and pacing
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    #[inline]
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Sleeper that records requested delays and returns immediately
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl RecordingSleeper {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order
    #[inline]
    pub fn delays(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[inline]
    pub fn total(&self) -> Duration {
        self.delays().iter().sum()
    }
}

#[cfg(test)]
#[async_trait]
impl Sleeper for RecordingSleeper {
    #[inline]
    async fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

/// Successful result of a retried operation
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails permanently, or the policy is exhausted
///
/// Only transient failures are retried. The last error is returned unchanged.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    operation_name: &str,
    mut operation: F,
) -> Result<Retried<T>, ServiceError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, ServiceError>> + Send,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut slept = Duration::ZERO;

    for attempt in 1..=max_attempts {
        debug!("{} attempt {}/{}", operation_name, attempt, max_attempts);

        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(Retried {
                    value,
                    attempts: attempt,
                });
            }
            Err(error) => error,
        };

        if !error.is_transient() {
            warn!("{} failed permanently: {}", operation_name, error);
            return Err(error);
        }

        if attempt == max_attempts {
            error!(
                "{} failed after {} attempts: {}",
                operation_name, attempt, error
            );
            return Err(error);
        }

        let delay = policy.delay_before_retry(attempt);
        if let Some(ceiling) = policy.max_total_delay {
            if slept.saturating_add(delay) > ceiling {
                error!(
                    "{} giving up after {} attempts, backoff ceiling {:?} reached: {}",
                    operation_name, attempt, ceiling, error
                );
                return Err(error);
            }
        }

        warn!(
            "{} attempt {}/{} failed ({}), retrying in {:?}",
            operation_name, attempt, max_attempts, error, delay
        );
        sleeper.sleep(delay).await;
        slept = slept.saturating_add(delay);
    }

    Err(ServiceError::Permanent(format!(
        "{} made no attempts",
        operation_name
    )))
}
