use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

/// Longest interval a limiter will enforce, reached at 0.001 requests per
/// second.
pub const MAX_INTERVAL: Duration = Duration::from_secs(1000);

/// Enforces a minimum interval between calls to the remote store.
///
/// Callers block in [`RateLimiter::acquire`] until they are eligible. The
/// lock is held across the sleep so concurrent callers are released one at
/// a time, in the order they obtained the lock.
pub struct RateLimiter {
    min_interval: Duration,
    last_granted: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// # Panics
    /// Panics if `requests_per_second` is not a positive finite number.
    /// Rates below 0.001 are clamped to [`MAX_INTERVAL`].
    pub fn new(requests_per_second: f64) -> Self {
        assert!(
            requests_per_second.is_finite() && requests_per_second > 0.0,
            "requests_per_second must be > 0"
        );
        Self {
            min_interval: Duration::try_from_secs_f64(1.0 / requests_per_second)
                .map_or(MAX_INTERVAL, |interval| interval.min(MAX_INTERVAL)),
            last_granted: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn acquire(&self) {
        // A poisoned lock only means another caller panicked mid-sleep; the
        // timestamp it guards is still usable.
        let mut last = self
            .last_granted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Rate limiting remote call");
                thread::sleep(wait);
            }
        }

        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_first_acquire_does_not_wait() {
        let limiter = RateLimiter::new(1.0);
        let start = Instant::now();
        limiter.acquire();
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_sequential_calls_respect_rate() {
        let limiter = RateLimiter::new(50.0);
        let start = Instant::now();
        for _ in 0..6 {
            limiter.acquire();
        }
        // 5 intervals of 20ms
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_concurrent_callers_are_serialized() {
        let limiter = Arc::new(RateLimiter::new(100.0));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || {
                    for _ in 0..2 {
                        limiter.acquire();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // 8 grants, 7 intervals of 10ms
        assert!(start.elapsed() >= Duration::from_millis(70));
    }

    #[test]
    fn test_tiny_rate_is_clamped() {
        assert_eq!(RateLimiter::new(1e-30).min_interval(), MAX_INTERVAL);
        assert_eq!(RateLimiter::new(f64::MIN_POSITIVE).min_interval(), MAX_INTERVAL);
        assert_eq!(RateLimiter::new(4.0).min_interval(), Duration::from_millis(250));
    }

    #[test]
    #[should_panic(expected = "requests_per_second must be > 0")]
    fn test_zero_rate_rejected() {
        let _ = RateLimiter::new(0.0);
    }
}
