use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

// Bounds shared with schema/config-v1.json; environment overrides bypass the
// schema and are checked against these.
const MIN_REQUESTS_PER_SECOND: f64 = 0.001;
const MAX_REQUESTS_PER_SECOND: f64 = 1000.0;
const MAX_RETRIES: u32 = 20;
const MAX_BACKOFF_BASE: f64 = 10.0;
const MAX_TIMEOUT_SECONDS: u64 = 86_400;

/// Loads a config file, then applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = load_config_from_str(&content)?;
    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

/// Built-in defaults with environment overrides, for runs without a file.
pub fn config_from_env() -> Result<Config, ConfigError> {
    let mut config = Config::default();
    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    let workers = &config.workers;
    if workers.download == 0 || workers.upload == 0 || workers.convert == 0 {
        return Err(invalid("worker counts must be greater than zero"));
    }

    let timeouts = &config.timeouts;
    for (name, seconds) in [
        ("download_seconds", timeouts.download_seconds),
        ("conversion_seconds", timeouts.conversion_seconds),
        ("upload_seconds", timeouts.upload_seconds),
    ] {
        if seconds == 0 || seconds > MAX_TIMEOUT_SECONDS {
            return Err(invalid(format!(
                "{} must be between 1 and {}, got {}",
                name, MAX_TIMEOUT_SECONDS, seconds
            )));
        }
    }

    let rps = config.rate_limit.requests_per_second;
    if !(MIN_REQUESTS_PER_SECOND..=MAX_REQUESTS_PER_SECOND).contains(&rps) {
        return Err(invalid(format!(
            "requests_per_second must be between {} and {}, got {}",
            MIN_REQUESTS_PER_SECOND, MAX_REQUESTS_PER_SECOND, rps
        )));
    }

    if !(1..=MAX_RETRIES).contains(&config.retry.max_retries) {
        return Err(invalid(format!(
            "max_retries must be between 1 and {}",
            MAX_RETRIES
        )));
    }
    if !(1.0..=MAX_BACKOFF_BASE).contains(&config.retry.backoff_base) {
        return Err(invalid(format!(
            "backoff_base must be between 1.0 and {}",
            MAX_BACKOFF_BASE
        )));
    }

    let breaker = &config.circuit_breaker;
    if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
        return Err(invalid("circuit breaker thresholds must be at least 1"));
    }
    if breaker.timeout_seconds > MAX_TIMEOUT_SECONDS {
        return Err(invalid(format!(
            "circuit breaker timeout_seconds must be at most {}",
            MAX_TIMEOUT_SECONDS
        )));
    }

    if config.page_size == 0 {
        return Err(invalid("page_size must be greater than zero"));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

/// Applies overrides from the process environment.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    apply_overrides(config, |name| std::env::var(name).ok())
}

/// Applies overrides from `lookup`. Unset variables leave the value alone;
/// values that do not parse are rejected.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("GD_FOLDER") {
        config.source_folder = v;
    }
    if let Some(v) = env.string("GD_OUTPUT_FOLDER") {
        config.output_folder = v;
    }
    if let Some(v) = env.string("TEMP_DIR") {
        config.staging_directory = PathBuf::from(v);
    }
    if let Some(v) = env.string("STORE_ROOT") {
        config.store_root = PathBuf::from(v);
    }

    env.set("MAX_WORKERS_DL", &mut config.workers.download)?;
    env.set("MAX_WORKERS_UL", &mut config.workers.upload)?;
    env.set("MAX_WORKERS_PROC", &mut config.workers.convert)?;

    env.set("TIMEOUT_DL", &mut config.timeouts.download_seconds)?;
    env.set("TIMEOUT_CONV", &mut config.timeouts.conversion_seconds)?;
    env.set("TIMEOUT_UL", &mut config.timeouts.upload_seconds)?;

    env.set("RATE_LIMIT", &mut config.rate_limit.requests_per_second)?;
    env.set("MAX_RETRIES", &mut config.retry.max_retries)?;
    env.set("RETRY_BACKOFF", &mut config.retry.backoff_base)?;

    if let Some(v) = env.string("LOG_LEVEL") {
        config.logging.level = v.to_lowercase();
    }
    if let Some(v) = env.string("LOG_FORMAT_JSON") {
        config.logging.json = parse_bool(&v).ok_or_else(|| ConfigError::InvalidEnvOverride {
            name: "LOG_FORMAT_JSON".to_string(),
            value: v.clone(),
        })?;
    }

    Ok(())
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn set<T: FromStr>(&self, name: &str, target: &mut T) -> Result<(), ConfigError> {
        if let Some(raw) = self.string(name) {
            *target = raw.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                name: name.to_string(),
                value: raw.clone(),
            })?;
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
