use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Slash-delimited path of the folder holding input DICOM data.
    #[serde(default = "default_source_folder")]
    pub source_folder: String,
    /// Slash-delimited path of the folder receiving NIfTI results.
    #[serde(default = "default_output_folder")]
    pub output_folder: String,
    /// Root directory of the filesystem-backed store.
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,
    #[serde(default = "default_staging_directory")]
    pub staging_directory: PathBuf,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            source_folder: default_source_folder(),
            output_folder: default_output_folder(),
            store_root: default_store_root(),
            staging_directory: default_staging_directory(),
            page_size: default_page_size(),
            workers: WorkersConfig::default(),
            timeouts: TimeoutsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            converter: ConverterConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_source_folder() -> String {
    "Medicina/Doutorado IDOR/Exames/DICOM".to_string()
}

fn default_output_folder() -> String {
    "Medicina/Doutorado IDOR/Exames/NifTI".to_string()
}

fn default_store_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_staging_directory() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_page_size() -> usize {
    100
}

/// Pool sizes. Download and upload wait on the network; conversion is
/// CPU bound and sized from the core count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_download_workers")]
    pub download: usize,
    #[serde(default = "default_upload_workers")]
    pub upload: usize,
    #[serde(default = "default_convert_workers")]
    pub convert: usize,
}

fn default_download_workers() -> usize {
    5
}

fn default_upload_workers() -> usize {
    3
}

fn default_convert_workers() -> usize {
    num_cpus::get().saturating_sub(2).max(1)
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            download: default_download_workers(),
            upload: default_upload_workers(),
            convert: default_convert_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_download_timeout")]
    pub download_seconds: u64,
    #[serde(default = "default_conversion_timeout")]
    pub conversion_seconds: u64,
    #[serde(default = "default_upload_timeout")]
    pub upload_seconds: u64,
}

fn default_download_timeout() -> u64 {
    300
}

fn default_conversion_timeout() -> u64 {
    600
}

fn default_upload_timeout() -> u64 {
    300
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            download_seconds: default_download_timeout(),
            conversion_seconds: default_conversion_timeout(),
            upload_seconds: default_upload_timeout(),
        }
    }
}

impl TimeoutsConfig {
    pub fn conversion(&self) -> Duration {
        Duration::from_secs(self.conversion_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
}

fn default_requests_per_second() -> f64 {
    5.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_breaker_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_breaker_timeout() -> u64 {
    60
}

fn default_success_threshold() -> u32 {
    2
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            timeout_seconds: default_breaker_timeout(),
            success_threshold: default_success_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default = "default_executable")]
    pub executable: String,
    /// dcm2niix output name template (`%p` patient, `%t` time, `%s` series).
    #[serde(default = "default_filename_template")]
    pub filename_template: String,
    #[serde(default = "default_true")]
    pub compress: bool,
    #[serde(default = "default_true")]
    pub bids_sidecar: bool,
}

fn default_executable() -> String {
    "dcm2niix".to_string()
}

fn default_filename_template() -> String {
    "%p_%t_%s".to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            filename_template: default_filename_template(),
            compress: true,
            bids_sidecar: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
