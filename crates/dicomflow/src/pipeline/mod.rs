pub mod config;
pub mod context;
pub mod runner;
pub mod stats;

pub use config::PipelineConfig;
pub use context::{Stage, StageItem, StageOutcome};
pub use runner::BatchPipeline;
pub use stats::RunStats;
