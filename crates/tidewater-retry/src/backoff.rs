//! Retry loop and backoff budget.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tide_core::CoreResult;
use tide_core::config::{RetrySection, parse_duration};
use tracing::debug;

use crate::error::RetryError;

/// Attempt budget and sleep bounds for one retried call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first. At least one
    /// invocation always happens.
    pub attempts: u32,
    /// Sleep after the first failure.
    pub initial_sleep: Duration,
    /// Upper bound for the doubled sleep.
    pub max_sleep: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_SLEEP: Duration = Duration::from_millis(1000);

    pub fn new(attempts: u32, initial_sleep: Duration) -> Self {
        Self {
            attempts,
            initial_sleep,
            max_sleep: Self::DEFAULT_MAX_SLEEP,
        }
    }

    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    pub fn from_section(section: &RetrySection) -> CoreResult<Self> {
        Ok(Self {
            attempts: section.attempts,
            initial_sleep: parse_duration(&section.initial_sleep)?,
            max_sleep: parse_duration(&section.max_sleep)?,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_millis(500))
    }
}

/// Remaining budget of an in-progress retry run.
#[derive(Debug)]
pub struct Backoff {
    remaining: u32,
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            remaining: policy.attempts.max(1),
            current: policy.initial_sleep,
            max: policy.max_sleep,
        }
    }

    /// Consume one attempt after a failure.
    ///
    /// Returns the sleep before the next attempt, or `None` once the
    /// budget is spent. Each returned sleep doubles the previous one,
    /// capped at the policy maximum.
    pub fn next_sleep(&mut self) -> Option<Duration> {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            return None;
        }
        let sleep = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        Some(sleep)
    }

    /// Attempts left after the ones already consumed.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

/// Run `op` until it succeeds, fails permanently, or the budget runs out.
///
/// Transient failures sleep and retry. A [`RetryError::Permanent`] failure
/// returns its inner error immediately. On exhaustion the last error is
/// returned. `op` is re-invoked verbatim and must be idempotent.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError<E>>>,
    E: Display,
{
    let mut backoff = Backoff::new(policy);
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(RetryError::Permanent(e)) => {
                debug!(error = %e, "retry interrupted by non-retriable error");
                return Err(e);
            }
            Err(RetryError::Transient(e)) => match backoff.next_sleep() {
                Some(sleep) => {
                    debug!(
                        attempts = backoff.remaining(),
                        ?sleep,
                        error = %e,
                        "retry func error"
                    );
                    tokio::time::sleep(sleep).await;
                }
                None => {
                    debug!(error = %e, "retry attempts exhausted");
                    return Err(e);
                }
            },
        }
    }
}
