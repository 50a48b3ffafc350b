use std::fmt::Display;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::error::StoreError;

/// Upper bound on a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Failure kinds that are worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// Bounded exponential backoff.
///
/// `max_retries` is the total number of attempts. After a retryable failure
/// on attempt `n` (counted from 0) the policy sleeps `backoff_base^n` delay
/// units, plus a uniform `[0, 1)` unit when jitter is enabled. The delay
/// unit is one second unless overridden. Delays are capped at
/// [`MAX_BACKOFF`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: f64,
    pub jitter: bool,
    pub delay_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 2.0, true)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: f64, jitter: bool) -> Self {
        Self {
            max_retries,
            backoff_base,
            jitter,
            delay_unit: Duration::from_secs(1),
        }
    }

    pub fn with_delay_unit(mut self, delay_unit: Duration) -> Self {
        self.delay_unit = delay_unit;
        self
    }

    /// Delay before the attempt following failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let mut factor = self.backoff_base.powi(exponent);
        if self.jitter {
            factor += rand::rng().random::<f64>();
        }
        if factor.is_nan() || factor < 0.0 {
            return self.delay_unit.min(MAX_BACKOFF);
        }
        Duration::try_from_secs_f64(self.delay_unit.as_secs_f64() * factor)
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }

    /// Runs `operation`, retrying failures the error type classifies as
    /// retryable.
    pub fn run<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Result<T, E>,
    {
        self.run_if(operation, |e: &E| e.is_retryable())
    }

    /// Runs `operation`, retrying only failures accepted by `is_retryable`.
    /// Other failures propagate immediately without consuming an attempt.
    pub fn run_if<T, E, F, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let attempts = self.max_retries.max(1);
        let mut attempt = 0;

        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(e) if !is_retryable(&e) => return Err(e),
                Err(e) => {
                    if attempt + 1 >= attempts {
                        error!(attempts, error = %e, "Giving up after {} attempts", attempts);
                        return Err(e);
                    }

                    let wait = self.delay_for(attempt);
                    warn!(
                        "Retry {}/{} (waiting {:.2}s): {}",
                        attempt + 1,
                        attempts,
                        wait.as_secs_f64(),
                        e
                    );
                    thread::sleep(wait);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, 2.0, false).with_delay_unit(Duration::from_millis(1))
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result: Result<u32, StoreError> = fast_policy(3).run(|| {
            calls.set(calls.get() + 1);
            if calls.get() <= 2 {
                Err(StoreError::Network("flaky".to_string()))
            } else {
                Ok(42)
            }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_always_failing_is_invoked_max_retries_times() {
        let calls = Cell::new(0);
        let result: Result<(), StoreError> = fast_policy(3).run(|| {
            calls.set(calls.get() + 1);
            Err(StoreError::Server {
                status: 503,
                message: format!("attempt {}", calls.get()),
            })
        });

        let err = result.unwrap_err();
        assert_eq!(calls.get(), 3);
        assert!(err.to_string().contains("attempt 3"));
    }

    #[test]
    fn test_non_retryable_propagates_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), StoreError> = fast_policy(5).run(|| {
            calls.set(calls.get() + 1);
            Err(StoreError::NotFound("file-1".to_string()))
        });

        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_custom_predicate() {
        let calls = Cell::new(0);
        let result: Result<(), String> = fast_policy(4).run_if(
            || {
                calls.set(calls.get() + 1);
                Err("boom".to_string())
            },
            |_| true,
        );
        assert!(result.is_err());
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let calls = Cell::new(0);
        let _: Result<(), StoreError> = fast_policy(0).run(|| {
            calls.set(calls.get() + 1);
            Err(StoreError::RateLimited)
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy::new(3, 2.0, false).with_delay_unit(Duration::from_millis(10));
        assert_eq!(policy.delay_for(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(80));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(4, 1e10, false);
        assert_eq!(policy.delay_for(2), MAX_BACKOFF);
        assert_eq!(policy.delay_for(u32::MAX), MAX_BACKOFF);

        let policy = RetryPolicy::new(4, 2.0, true);
        assert_eq!(policy.delay_for(40), MAX_BACKOFF);
    }

    #[test]
    fn test_jitter_stays_within_one_unit() {
        let policy = RetryPolicy::new(3, 2.0, true).with_delay_unit(Duration::from_millis(100));
        for _ in 0..20 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay < Duration::from_millis(300));
        }
    }
}
