//! Builder patterns for creating test data programmatically.
//!
//! These builders allow creating config files and tasks without
//! repetitive boilerplate code.

#![allow(dead_code)]

use serde_json::{json, Map, Value};

use dicomflow::discovery::StudyDescriptor;
use dicomflow::worker::{patient_label, Task};

/// Builds config JSON documents for the loader.
pub struct ConfigBuilder {
    version: String,
    source_folder: Option<String>,
    output_folder: Option<String>,
    staging_directory: Option<String>,
    workers: Map<String, Value>,
    retry: Map<String, Value>,
    rate_limit: Option<f64>,
    log_level: Option<String>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.0".to_string(),
            source_folder: None,
            output_folder: None,
            staging_directory: None,
            workers: Map::new(),
            retry: Map::new(),
            rate_limit: None,
            log_level: None,
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn source_folder(mut self, path: &str) -> Self {
        self.source_folder = Some(path.to_string());
        self
    }

    pub fn output_folder(mut self, path: &str) -> Self {
        self.output_folder = Some(path.to_string());
        self
    }

    pub fn staging_directory(mut self, path: &str) -> Self {
        self.staging_directory = Some(path.to_string());
        self
    }

    pub fn download_workers(mut self, n: usize) -> Self {
        self.workers.insert("download".to_string(), json!(n));
        self
    }

    pub fn convert_workers(mut self, n: usize) -> Self {
        self.workers.insert("convert".to_string(), json!(n));
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.retry.insert("max_retries".to_string(), json!(n));
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.retry.insert("jitter".to_string(), json!(enabled));
        self
    }

    pub fn rate_limit(mut self, rps: f64) -> Self {
        self.rate_limit = Some(rps);
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.log_level = Some(level.to_string());
        self
    }

    pub fn build(self) -> Value {
        let mut doc = Map::new();
        doc.insert("version".to_string(), json!(self.version));
        if let Some(v) = self.source_folder {
            doc.insert("source_folder".to_string(), json!(v));
        }
        if let Some(v) = self.output_folder {
            doc.insert("output_folder".to_string(), json!(v));
        }
        if let Some(v) = self.staging_directory {
            doc.insert("staging_directory".to_string(), json!(v));
        }
        if !self.workers.is_empty() {
            doc.insert("workers".to_string(), Value::Object(self.workers));
        }
        if !self.retry.is_empty() {
            doc.insert("retry".to_string(), Value::Object(self.retry));
        }
        if let Some(rps) = self.rate_limit {
            doc.insert("rate_limit".to_string(), json!({ "requests_per_second": rps }));
        }
        if let Some(level) = self.log_level {
            doc.insert("logging".to_string(), json!({ "level": level }));
        }
        Value::Object(doc)
    }

    pub fn build_json(self) -> String {
        self.build().to_string()
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds tasks numbered the way discovery numbers them.
pub struct TaskBuilder {
    index: usize,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self { index: 0 }
    }

    pub fn file(&mut self, file_id: &str, name: &str) -> Task {
        let task = Task::new(file_id, name, patient_label(self.index), 0.1);
        self.index += 1;
        task
    }

    pub fn study(&mut self, folder_id: &str, name: &str, study_number: &str) -> Task {
        let descriptor = StudyDescriptor {
            name: name.to_string(),
            study_number: study_number.to_string(),
            dicom_folder_id: folder_id.to_string(),
        };
        let task = Task::from_study(descriptor, self.index);
        self.index += 1;
        task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}
