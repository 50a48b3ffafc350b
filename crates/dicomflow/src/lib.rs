pub mod config;
pub mod dicom;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod remote;
pub mod resilience;
pub mod storage;
pub mod worker;

pub use config::{config_from_env, load_config, Config};
pub use dicom::{ConversionOutput, Converter, Dcm2Niix};
pub use discovery::{discover_studies, FolderResolver, RecursiveLister, StudyDescriptor};
pub use error::{
    CircuitOpenError, ConfigError, ConvertError, DicomflowError, DiscoveryError, Result,
    StagingError, StoreError, WorkerError,
};
pub use pipeline::{BatchPipeline, PipelineConfig, RunStats};
pub use remote::{FileMetadata, FsStore, RateLimitedStore, RemoteStore};
pub use resilience::{CircuitBreaker, CircuitState, RateLimiter, RetryPolicy};
pub use storage::StagingArea;
pub use worker::{ProcessingResult, ProcessingStatus, Task, WorkerPool};
