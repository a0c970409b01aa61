//! Exponential backoff with jitter, and the attempt loop that drives it.
//!
//! [`RetryPolicy`] is pure configuration. [`Executor`] runs an async
//! operation up to `max_attempts` times, asking the failed attempt's error
//! (via [`Retryable`]) whether another attempt makes sense and sleeping on a
//! cancellable timer in between.
//!
//! # Backoff
//!
//! `delay(attempt) = initial_delay * multiplier^(attempt - 1)`, capped at
//! `max_delay`. Jitter is then applied multiplicatively:
//! `delay += delay * jitter_factor * uniform(-1, 1)`. The jittered value is
//! not re-capped, so a delay near the cap may exceed `max_delay` by up to
//! `jitter_factor`.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use marketplace_api::RetryPolicy;
//!
//! let policy = RetryPolicy::default().with_jitter_factor(0.0);
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
//! assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
//! assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(30));
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::clients::errors::Retryable;
use crate::error::ConfigError;

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the second attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound on the un-jittered delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Backoff configuration.
///
/// Policies are immutable values; the `with_*` methods return modified copies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Sets the total number of attempts, including the first.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the delay after the first failed attempt.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the cap applied before jitter.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor between consecutive delays.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter factor, in `[0, 1]`.
    #[must_use]
    pub const fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Returns the total number of attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay after the first failed attempt.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Returns the cap applied before jitter.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Returns the growth factor.
    #[must_use]
    pub const fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Returns the jitter factor.
    #[must_use]
    pub const fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }

    /// Checks that the policy can drive an attempt loop.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRetryPolicy`] if `max_attempts` is zero,
    /// the multiplier is below 1, the jitter factor is outside `[0, 1]`, or
    /// the initial delay exceeds the cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let reason = if self.max_attempts == 0 {
            "max_attempts must be at least 1"
        } else if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            "multiplier must be a finite number >= 1"
        } else if !(0.0..=1.0).contains(&self.jitter_factor) {
            "jitter_factor must be between 0 and 1"
        } else if self.initial_delay > self.max_delay {
            "initial_delay must not exceed max_delay"
        } else {
            return Ok(());
        };
        Err(ConfigError::InvalidRetryPolicy {
            reason: reason.to_string(),
        })
    }

    /// Returns the un-jittered delay after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Returns the jittered delay after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter_factor <= 0.0 {
            return base;
        }

        let spread: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
        let secs = base.as_secs_f64() * self.jitter_factor.mul_add(spread, 1.0);
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(base)
    }

    /// Returns `true` if a failure on attempt `attempt` should be retried.
    #[must_use]
    pub fn should_retry<E: Retryable>(&self, error: &E, attempt: u32) -> bool {
        attempt < self.max_attempts && error.is_retryable()
    }
}

/// Outcome of [`Executor::execute`].
///
/// Always reports the number of attempts made and the wall time spent,
/// whether or not the operation eventually succeeded.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Total time spent, including backoff.
    pub duration: Duration,
    /// The successful value, if any attempt succeeded.
    pub value: Option<T>,
    /// The error from the final failed attempt, or the cancellation error.
    ///
    /// `None` when an attempt succeeded.
    pub last_error: Option<E>,
}

impl<T, E: Retryable> RetryResult<T, E> {
    /// Returns `true` if an attempt succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.value.is_some()
    }

    /// Converts the outcome into a plain `Result`.
    ///
    /// # Errors
    ///
    /// Returns the last error if no attempt succeeded.
    pub fn into_result(self) -> Result<T, E> {
        match (self.value, self.last_error) {
            (Some(value), _) => Ok(value),
            (None, Some(error)) => Err(error),
            (None, None) => Err(E::cancelled()),
        }
    }
}

/// Drives an operation through a [`RetryPolicy`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Executor {
    policy: RetryPolicy,
}

impl Executor {
    /// Creates an executor for the given policy.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy this executor applies.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent.
    ///
    /// The closure receives the 1-based attempt number. Cancellation aborts
    /// both an in-flight attempt and a pending backoff sleep, and is reported
    /// through `last_error` as `E::cancelled()`.
    pub async fn execute<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> RetryResult<T, E>
    where
        E: Retryable + fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                last_error = Some(E::cancelled());
                break;
            }
            attempts = attempt;

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(E::cancelled()),
                outcome = operation(attempt) => outcome,
            };

            let error = match outcome {
                Ok(value) => {
                    return RetryResult {
                        attempts,
                        duration: start.elapsed(),
                        value: Some(value),
                        last_error: None,
                    };
                }
                Err(error) => error,
            };

            if !self.policy.should_retry(&error, attempt) {
                last_error = Some(error);
                break;
            }

            let delay = if error.retry_immediately() {
                Duration::ZERO
            } else {
                self.policy.delay_for_attempt(attempt)
            };
            tracing::debug!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis(),
                error = %error,
                "attempt failed, backing off"
            );
            last_error = Some(error);

            let cancelled = tokio::select! {
                biased;
                () = cancel.cancelled() => true,
                () = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                last_error = Some(E::cancelled());
                break;
            }
        }

        RetryResult {
            attempts,
            duration: start.elapsed(),
            value: None,
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::errors::{ApiError, ClientError, ErrorCode};

    fn server_error() -> ClientError {
        ClientError::Api(ApiError::new(ErrorCode::Server, "internal", 500))
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_initial_delay(Duration::from_millis(10))
            .with_jitter_factor(0.0)
    }

    #[test]
    fn test_default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.initial_delay(), Duration::from_secs(1));
        assert_eq!(policy.max_delay(), Duration::from_secs(30));
        assert!((policy.multiplier() - 2.0).abs() < f64::EPSILON);
        assert!((policy.jitter_factor() - 0.1).abs() < f64::EPSILON);
        assert_eq!(RetryPolicy::no_retry().max_attempts(), 1);
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let policy = RetryPolicy::default().with_jitter_factor(0.0);
        let delays: Vec<u64> = (1..=6)
            .map(|attempt| policy.delay_for_attempt(attempt).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30]);
    }

    #[test]
    fn test_base_delay_survives_huge_attempt_numbers() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_factor() {
        let policy = RetryPolicy::default().with_jitter_factor(0.5);
        for _ in 0..200 {
            let delay = policy.delay_for_attempt(2).as_secs_f64();
            assert!((1.0..=3.0).contains(&delay), "delay {delay}");
        }
    }

    #[test]
    fn test_jitter_may_exceed_cap() {
        let policy = RetryPolicy::default()
            .with_initial_delay(Duration::from_secs(30))
            .with_jitter_factor(1.0);
        let max_seen = (0..500)
            .map(|_| policy.delay_for_attempt(1))
            .max()
            .unwrap();
        assert!(max_seen > Duration::from_secs(30));
        assert!(max_seen <= Duration::from_secs(60));
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::no_retry().validate().is_ok());
        for policy in [
            RetryPolicy::default().with_max_attempts(0),
            RetryPolicy::default().with_multiplier(0.5),
            RetryPolicy::default().with_multiplier(f64::NAN),
            RetryPolicy::default().with_jitter_factor(1.5),
            RetryPolicy::default().with_jitter_factor(-0.1),
            RetryPolicy::default().with_initial_delay(Duration::from_secs(60)),
        ] {
            assert!(
                matches!(policy.validate(), Err(ConfigError::InvalidRetryPolicy { .. })),
                "{policy:?}"
            );
        }
    }

    #[test]
    fn test_should_retry_respects_budget_and_error() {
        let policy = fast_policy(3);
        assert!(policy.should_retry(&server_error(), 1));
        assert!(policy.should_retry(&server_error(), 2));
        assert!(!policy.should_retry(&server_error(), 3));

        let validation = ClientError::Api(ApiError::new(ErrorCode::Param, "bad", 400));
        assert!(!policy.should_retry(&validation, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_makes_exactly_max_attempts() {
        let executor = Executor::new(fast_policy(4));
        let cancel = CancellationToken::new();
        let mut calls = 0;

        let result: RetryResult<(), _> = executor
            .execute(&cancel, |_| {
                calls += 1;
                async { Err(server_error()) }
            })
            .await;

        assert_eq!(calls, 4);
        assert_eq!(result.attempts, 4);
        assert!(!result.is_success());
        let error = result.last_error.unwrap();
        assert_eq!(error.as_api_error().unwrap().code, ErrorCode::Server);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_stops_on_non_retryable_error() {
        let executor = Executor::new(fast_policy(5));
        let cancel = CancellationToken::new();
        let mut calls = 0;

        let result: RetryResult<(), _> = executor
            .execute(&cancel, |_| {
                calls += 1;
                async { Err(ClientError::Api(ApiError::new(ErrorCode::Param, "bad", 400))) }
            })
            .await;

        assert_eq!(calls, 1);
        assert_eq!(result.attempts, 1);
        assert!(result.duration < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_clears_last_error_on_success() {
        let executor = Executor::new(fast_policy(3));
        let cancel = CancellationToken::new();

        let result = executor
            .execute(&cancel, |attempt| async move {
                if attempt < 3 {
                    Err(server_error())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.attempts, 3);
        assert!(result.last_error.is_none());
        assert_eq!(result.into_result().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_waits_backoff_between_attempts() {
        let executor = Executor::new(
            RetryPolicy::default()
                .with_max_attempts(3)
                .with_jitter_factor(0.0),
        );
        let cancel = CancellationToken::new();

        let result: RetryResult<(), _> = executor
            .execute(&cancel, |_| async { Err(server_error()) })
            .await;

        // 1s after the first failure, 2s after the second, none after the last.
        assert_eq!(result.duration.as_secs(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshed_credentials_retry_without_backoff() {
        let executor = Executor::new(RetryPolicy::default().with_jitter_factor(0.0));
        let cancel = CancellationToken::new();

        let result: RetryResult<u32, _> = executor
            .execute(&cancel, |attempt| async move {
                if attempt == 1 {
                    Err(ClientError::CredentialsRefreshed {
                        original: ApiError::new(ErrorCode::Auth, "access_token invalid", 403),
                    })
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.attempts, 2);
        assert_eq!(result.duration, Duration::ZERO);
        assert_eq!(result.value, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_backoff_returns_promptly() {
        let executor = Executor::new(
            RetryPolicy::default()
                .with_initial_delay(Duration::from_secs(5))
                .with_jitter_factor(0.0),
        );
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result: RetryResult<(), _> = executor
            .execute(&cancel, |_| async { Err(server_error()) })
            .await;

        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(result.attempts, 1);
        assert!(result.last_error.unwrap().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_in_flight_attempt() {
        let executor = Executor::new(fast_policy(3));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result: RetryResult<(), ClientError> = executor
            .execute(&cancel, |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result.last_error, Some(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn test_already_cancelled_token_makes_no_attempts() {
        let executor = Executor::new(fast_policy(3));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut calls = 0;

        let result: RetryResult<(), ClientError> = executor
            .execute(&cancel, |_| {
                calls += 1;
                async { Ok(()) }
            })
            .await;

        assert_eq!(calls, 0);
        assert_eq!(result.attempts, 0);
        assert!(result.into_result().unwrap_err().is_cancelled());
    }
}
