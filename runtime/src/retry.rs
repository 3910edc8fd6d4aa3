//! Retry with constant or exponential-with-jitter backoff.
//!
//! Used by the notification dispatcher around provider sends. An operation is
//! attempted up to `max_retries + 1` times; a predicate decides whether an
//! error is worth another attempt.
//!
//! # Example
//!
//! ```rust
//! use slotbook_runtime::retry::{Backoff, RetryPolicy, retry_with_predicate};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(3)
//!     .base_delay(Duration::from_millis(50))
//!     .backoff(Backoff::exponential(2.0, Duration::from_secs(5)))
//!     .build();
//!
//! let value = retry_with_predicate(
//!     &policy,
//!     || async { Ok::<_, String>(42) },
//!     |err: &String| err.contains("transient"),
//! )
//! .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Always wait `base_delay`
    Constant,
    /// `base_delay * multiplier^attempt`, capped at `max_delay`, then jittered
    /// into `[delay / 2, delay]`
    Exponential {
        /// Growth factor per attempt
        multiplier: f64,
        /// Upper bound before jitter
        max_delay: Duration,
        /// Randomise each delay
        jitter: bool,
    },
}

impl Backoff {
    /// Exponential backoff with jitter.
    #[must_use]
    pub const fn exponential(multiplier: f64, max_delay: Duration) -> Self {
        Self::Exponential {
            multiplier,
            max_delay,
            jitter: true,
        }
    }
}

/// Retry policy configuration.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `base_delay`: 100ms
/// - `backoff`: exponential, multiplier 2.0, capped at 30 seconds, jittered
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Growth strategy
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            backoff: Backoff::exponential(2.0, Duration::from_secs(30)),
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// Total attempts allowed (`max_retries + 1`).
    #[must_use]
    pub const fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `attempt` (0-based) without jitter.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn nominal_delay(&self, attempt: usize) -> Duration {
        match self.backoff {
            Backoff::Constant => self.base_delay,
            Backoff::Exponential {
                multiplier,
                max_delay,
                ..
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let delay_ms = self.base_delay.as_millis() as f64 * multiplier.powi(exponent);
                if !delay_ms.is_finite() || delay_ms >= max_delay.as_millis() as f64 {
                    max_delay
                } else {
                    Duration::from_millis(delay_ms as u64)
                }
            }
        }
    }

    /// Delay before retry number `attempt` (0-based), jittered when configured.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let nominal = self.nominal_delay(attempt);
        match self.backoff {
            Backoff::Exponential { jitter: true, .. } if nominal > Duration::ZERO => {
                let half = nominal / 2;
                let spread = nominal.saturating_sub(half);
                let offset = rand::thread_rng().gen_range(0..=spread.as_micros());
                half + Duration::from_micros(u64::try_from(offset).unwrap_or(u64::MAX))
            }
            _ => nominal,
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    /// Set delay before the first retry.
    #[must_use]
    pub const fn base_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self
    }

    /// Set backoff strategy.
    #[must_use]
    pub const fn backoff(mut self, backoff: Backoff) -> Self {
        self.policy.backoff = backoff;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

/// Retry an async operation while `is_retryable` accepts the error.
///
/// Non-retryable errors are returned immediately. After `max_retries`
/// retries the last error is returned.
///
/// # Errors
///
/// Returns the operation's error when it is not retryable or when every
/// attempt failed.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempt = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::warn!(error = %err, "Error is not retryable, failing immediately");
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    tracing::error!(
                        attempts = attempt + 1,
                        error = %err,
                        "Operation failed after max retries"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying..."
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Retry an async operation on every error.
///
/// # Errors
///
/// Returns the last error once every attempt failed.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_predicate(policy, operation, |_| true).await
}
