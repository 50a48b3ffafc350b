pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use rate_limiter::{RateLimiter, MAX_INTERVAL};
pub use retry::{Retryable, RetryPolicy, MAX_BACKOFF};
