pub mod loader;
pub mod schema;

use crate::resilience::{RateLimiter, RetryPolicy};

pub use loader::{
    apply_env_overrides, apply_overrides, config_from_env, load_config, load_config_from_str,
    validate_config,
};
pub use schema::{
    CircuitBreakerConfig, Config, ConverterConfig, LoggingConfig, RateLimitConfig, RetryConfig,
    TimeoutsConfig, WorkersConfig,
};

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            self.retry.backoff_base,
            self.retry.jitter,
        )
    }

    /// Panics on a non-positive rate; `validate_config` rejects those.
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.rate_limit.requests_per_second)
    }
}
