//! Retry wrapper for store-facing operations.
//!
//! Nothing inside the query or write paths retries on its own; callers wrap
//! whole operations with [`retry`] and pick a policy. Conditional-write
//! failures reach the policy like any other error, so a policy that should
//! not retry them must say so (see [`RetryPolicy::custom`]).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

/// Callback deciding whether a failure is retried, and after what delay.
pub type RetryDecider = dyn Fn(&Error, u32) -> Option<Duration> + Send + Sync;

/// When and how often to re-run a failed operation.
pub enum RetryPolicy {
    /// Retry up to this many times with no delay.
    Count(u32),
    /// Retry up to `max` times, sleeping `delay` before each attempt.
    Fixed {
        /// Maximum number of retries.
        max: u32,
        /// Pause before each retry.
        delay: Duration,
    },
    /// Ask a callback per failure; `Some(delay)` retries after the delay,
    /// `None` propagates the error.
    Custom(Arc<RetryDecider>),
}

impl RetryPolicy {
    /// A policy driven by a callback receiving the error and the 1-based
    /// retry attempt index.
    pub fn custom<F>(decider: F) -> Self
    where
        F: Fn(&Error, u32) -> Option<Duration> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(decider))
    }

    /// Decide whether retry attempt `attempt` (1-based) should run, and
    /// after what delay.
    #[must_use]
    pub fn decision(&self, error: &Error, attempt: u32) -> Option<Duration> {
        match self {
            Self::Count(max) => (attempt <= *max).then_some(Duration::ZERO),
            Self::Fixed { max, delay } => (attempt <= *max).then_some(*delay),
            Self::Custom(decider) => decider(error, attempt),
        }
    }
}

impl Clone for RetryPolicy {
    fn clone(&self) -> Self {
        match self {
            Self::Count(max) => Self::Count(*max),
            Self::Fixed { max, delay } => Self::Fixed {
                max: *max,
                delay: *delay,
            },
            Self::Custom(decider) => Self::Custom(Arc::clone(decider)),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(max) => f.debug_tuple("Count").field(max).finish(),
            Self::Fixed { max, delay } => f
                .debug_struct("Fixed")
                .field("max", max)
                .field("delay", delay)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Run `operation`, re-running it per `policy` until it succeeds or the
/// policy declines.
///
/// # Errors
///
/// Returns the last error once the policy stops retrying.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0_u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                match policy.decision(&error, attempt) {
                    Some(delay) => {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    None => return Err(error),
                }
            }
        }
    }
}
