use std::path::PathBuf;
use std::time::Duration;

use crate::config::{CircuitBreakerConfig, Config};
use crate::resilience::{CircuitBreaker, RetryPolicy};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub download_workers: usize,
    pub upload_workers: usize,
    pub convert_workers: usize,
    pub download_timeout: Duration,
    pub conversion_timeout: Duration,
    /// Uploads cannot be interrupted mid-call; slower ones are logged.
    pub upload_timeout: Duration,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
    pub staging_directory: PathBuf,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            download_workers: config.workers.download,
            upload_workers: config.workers.upload,
            convert_workers: config.workers.convert,
            download_timeout: Duration::from_secs(config.timeouts.download_seconds),
            conversion_timeout: config.timeouts.conversion(),
            upload_timeout: Duration::from_secs(config.timeouts.upload_seconds),
            retry: config.retry_policy(),
            circuit_breaker: config.circuit_breaker.clone(),
            staging_directory: config.staging_directory.clone(),
        }
    }

    pub(crate) fn build_circuit_breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(
            self.circuit_breaker.failure_threshold,
            Duration::from_secs(self.circuit_breaker.timeout_seconds),
            self.circuit_breaker.success_threshold,
        )
    }
}
