use std::fmt::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::worker::{ProcessingResult, ProcessingStatus};

/// Batch counters. Written only by the orchestrating thread, after a stage
/// has drained.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// One record per failed or skipped task.
    pub failures: Vec<ProcessingResult>,
}

impl RunStats {
    pub fn start(total: usize) -> Self {
        Self {
            total,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Folds in the tasks that left the pipeline during one stage.
    pub fn absorb(&mut self, finished: Vec<ProcessingResult>) {
        for result in finished {
            match result.status {
                ProcessingStatus::Completed => self.completed += 1,
                ProcessingStatus::Skipped => {
                    self.skipped += 1;
                    self.failures.push(result);
                }
                _ => {
                    self.failed += 1;
                    self.failures.push(result);
                }
            }
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Tasks without a terminal outcome yet.
    pub fn in_flight(&self) -> usize {
        self.total
            .saturating_sub(self.completed + self.failed + self.skipped)
    }

    /// Wall-clock time of the run, up to now while it is still running.
    pub fn elapsed(&self) -> Duration {
        let Some(start) = self.started_at else {
            return Duration::ZERO;
        };
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - start).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn summary(&self) -> String {
        let elapsed = self.elapsed().as_secs_f64();
        let mut out = String::new();
        let _ = writeln!(out, "Total tasks: {}", self.total);
        let _ = writeln!(out, "Completed:   {}", self.completed);
        let _ = writeln!(out, "Failed:      {}", self.failed);
        let _ = writeln!(out, "Skipped:     {}", self.skipped);
        let _ = write!(
            out,
            "Elapsed:     {:.2}s ({:.2} min)",
            elapsed,
            elapsed / 60.0
        );
        for failure in &self.failures {
            let _ = write!(
                out,
                "\n  [{}] {} ({}): {}",
                failure.status,
                failure.file_id,
                failure.patient_id,
                failure.error.as_deref().unwrap_or("unknown error")
            );
        }
        out
    }
}
