use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DicomflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Remote store error: {0}")]
    Store(#[from] StoreError),

    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnvOverride { name: String, value: String },
}

/// Returned by the circuit breaker when it rejects a call without running it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("circuit breaker is open")]
pub struct CircuitOpenError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by remote store")]
    RateLimited,

    #[error("Remote server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

impl StoreError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Network(_) | StoreError::RateLimited => true,
            StoreError::Server { status, .. } => *status >= 500,
            StoreError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            StoreError::NotFound(_)
            | StoreError::PermissionDenied(_)
            | StoreError::InvalidRequest(_)
            | StoreError::CircuitOpen(_) => false,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Folder path is empty")]
    EmptyPath,

    #[error("Folder '{segment}' not found while resolving '{path}'")]
    FolderNotFound { path: String, segment: String },

    #[error("Failed to list folder '{folder_id}': {source}")]
    Listing {
        folder_id: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Converter executable '{executable}' is not available: {reason}")]
    NotInstalled { executable: String, reason: String },

    #[error("Input directory not found: {0}")]
    InputMissing(PathBuf),

    #[error("Failed to prepare output directory '{path}': {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch converter: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Conversion timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Conversion failed: {0}")]
    Failed(String),

    #[error("Conversion produced no image output in '{0}'")]
    NoOutput(PathBuf),
}

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, DicomflowError>;
