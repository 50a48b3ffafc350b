use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use crate::dicom::ConversionOutput;
use crate::worker::{ProcessingResult, ProcessingStatus, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Validate,
    Convert,
    Upload,
    Cleanup,
}

impl Stage {
    /// Status a task holds while this stage works on it.
    pub fn status(self) -> ProcessingStatus {
        match self {
            Stage::Download => ProcessingStatus::Downloading,
            Stage::Validate => ProcessingStatus::Validating,
            Stage::Convert => ProcessingStatus::Converting,
            Stage::Upload => ProcessingStatus::Uploading,
            Stage::Cleanup => ProcessingStatus::Completed,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Download => "download",
            Stage::Validate => "validate",
            Stage::Convert => "convert",
            Stage::Upload => "upload",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// Per-task state handed from one stage to the next.
#[derive(Debug)]
pub struct StageItem {
    pub task: Task,
    pub started: Instant,
    pub status: ProcessingStatus,

    // Download result: the file, or the directory for a study
    pub input_path: Option<PathBuf>,

    // Validation result
    pub dicom_files: usize,

    // Convert result
    pub output_dir: Option<PathBuf>,
    pub artifacts: Option<ConversionOutput>,
}

impl StageItem {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            started: Instant::now(),
            status: ProcessingStatus::Pending,
            input_path: None,
            dicom_files: 0,
            output_dir: None,
            artifacts: None,
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn fail(self, stage: Stage, error: impl fmt::Display) -> StageOutcome {
        StageOutcome::Finished(ProcessingResult::failed(
            &self.task,
            self.input_path.clone(),
            format!("{} failed: {}", stage, error),
            self.elapsed_seconds(),
        ))
    }

    pub fn skip(self, reason: impl Into<String>) -> StageOutcome {
        let input = self.input_path.clone().unwrap_or_default();
        StageOutcome::Finished(ProcessingResult::skipped(
            &self.task,
            input,
            reason.into(),
            self.elapsed_seconds(),
        ))
    }
}

/// What a stage did with one item.
#[derive(Debug)]
pub enum StageOutcome {
    /// Moves on to the next stage.
    Advance(StageItem),
    /// Left the pipeline: completed, failed or skipped.
    Finished(ProcessingResult),
}

impl StageOutcome {
    pub fn file_id(&self) -> &str {
        match self {
            StageOutcome::Advance(item) => &item.task.file_id,
            StageOutcome::Finished(result) => &result.file_id,
        }
    }
}
