use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::discovery::StudyDescriptor;
use crate::remote::FileMetadata;

/// One unit of work: a remote file, or a whole study folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Remote file id, or the study's DICOM folder id.
    pub file_id: String,
    pub file_name: String,
    /// Subject label such as `P001`.
    pub patient_id: String,
    pub size_mb: f64,
    pub study: Option<StudyDescriptor>,
}

impl Task {
    pub fn new(
        file_id: impl Into<String>,
        file_name: impl Into<String>,
        patient_id: impl Into<String>,
        size_mb: f64,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: file_name.into(),
            patient_id: patient_id.into(),
            size_mb,
            study: None,
        }
    }

    /// Task for the `index`-th discovered file (zero based).
    pub fn from_file(file: &FileMetadata, index: usize) -> Self {
        Self::new(
            file.id.clone(),
            file.name.clone(),
            patient_label(index),
            file.size_mb(),
        )
    }

    /// Task for the `index`-th discovered study (zero based).
    pub fn from_study(study: StudyDescriptor, index: usize) -> Self {
        Self {
            file_id: study.dicom_folder_id.clone(),
            file_name: study.name.clone(),
            patient_id: patient_label(index),
            size_mb: 0.0,
            study: Some(study),
        }
    }

    pub fn is_study(&self) -> bool {
        self.study.is_some()
    }

    /// Filesystem-safe form of the id, used to name staging directories.
    pub fn staging_key(&self) -> String {
        self.file_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

/// `P001`, `P002`, ... for zero-based `index`.
pub fn patient_label(index: usize) -> String {
    format!("P{:03}", index + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Downloading,
    Validating,
    Converting,
    Uploading,
    Completed,
    Failed,
    Skipped,
}

impl ProcessingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Validating => "validating",
            Self::Converting => "converting",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Terminal record for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub file_id: String,
    pub patient_id: String,
    pub status: ProcessingStatus,
    /// Local staging path of the downloaded input.
    pub input_path: Option<PathBuf>,
    /// Local conversion output directory.
    pub output_path: Option<PathBuf>,
    /// Remote ids of the uploaded artifacts.
    pub uploaded_ids: Vec<String>,
    pub error: Option<String>,
    pub duration_seconds: f64,
}

impl ProcessingResult {
    pub fn completed(
        task: &Task,
        input_path: PathBuf,
        output_path: PathBuf,
        uploaded_ids: Vec<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            file_id: task.file_id.clone(),
            patient_id: task.patient_id.clone(),
            status: ProcessingStatus::Completed,
            input_path: Some(input_path),
            output_path: Some(output_path),
            uploaded_ids,
            error: None,
            duration_seconds,
        }
    }

    pub fn failure(
        task: &Task,
        status: ProcessingStatus,
        input_path: Option<PathBuf>,
        error: String,
        duration_seconds: f64,
    ) -> Self {
        Self {
            file_id: task.file_id.clone(),
            patient_id: task.patient_id.clone(),
            status,
            input_path,
            output_path: None,
            uploaded_ids: Vec::new(),
            error: Some(error),
            duration_seconds,
        }
    }

    pub fn failed(
        task: &Task,
        input_path: Option<PathBuf>,
        error: String,
        duration_seconds: f64,
    ) -> Self {
        Self::failure(
            task,
            ProcessingStatus::Failed,
            input_path,
            error,
            duration_seconds,
        )
    }

    pub fn skipped(task: &Task, input_path: PathBuf, reason: String, duration_seconds: f64) -> Self {
        Self::failure(
            task,
            ProcessingStatus::Skipped,
            Some(input_path),
            reason,
            duration_seconds,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_labels() {
        assert_eq!(patient_label(0), "P001");
        assert_eq!(patient_label(41), "P042");
        assert_eq!(patient_label(999), "P1000");
    }

    #[test]
    fn test_task_from_file() {
        let meta = FileMetadata::file("exams/a.dcm", "a.dcm", 2 * 1024 * 1024, vec![]);
        let task = Task::from_file(&meta, 2);
        assert_eq!(task.file_id, "exams/a.dcm");
        assert_eq!(task.patient_id, "P003");
        assert!((task.size_mb - 2.0).abs() < f64::EPSILON);
        assert!(!task.is_study());
        assert_eq!(task.staging_key(), "exams_a.dcm");
    }

    #[test]
    fn test_task_from_study() {
        let study = StudyDescriptor {
            name: "001_head".to_string(),
            study_number: "001".to_string(),
            dicom_folder_id: "exams/001_head/DICOM".to_string(),
        };
        let task = Task::from_study(study, 0);
        assert!(task.is_study());
        assert_eq!(task.file_id, "exams/001_head/DICOM");
        assert_eq!(task.file_name, "001_head");
    }

    #[test]
    fn test_result_constructors() {
        let task = Task::new("id-1", "a.dcm", "P001", 1.0);
        let done = ProcessingResult::completed(
            &task,
            PathBuf::from("/s/a.dcm"),
            PathBuf::from("/s/out"),
            vec!["x".to_string()],
            1.5,
        );
        assert_eq!(done.status, ProcessingStatus::Completed);
        assert!(done.error.is_none());

        let skipped = ProcessingResult::skipped(&task, PathBuf::from("/s/a"), "bad".into(), 0.1);
        assert_eq!(skipped.status, ProcessingStatus::Skipped);
        assert!(skipped.status.is_terminal());
        assert_eq!(skipped.error.as_deref(), Some("bad"));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ProcessingStatus::Converting.to_string(), "converting");
        assert_eq!(
            serde_json::to_string(&ProcessingStatus::Skipped).unwrap(),
            "\"skipped\""
        );
    }
}
