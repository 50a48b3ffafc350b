//! Test harness for isolated test execution.
//!
//! The `TestHarness` owns a temporary directory holding the staging area,
//! an optional filesystem-backed store root and any config files a test
//! writes.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use dicomflow::config::CircuitBreakerConfig;
use dicomflow::dicom::detector::DICOM_MAGIC_OFFSET;
use dicomflow::{PipelineConfig, RetryPolicy};

/// A DICOM Part 10 file: zeroed preamble, `DICM`, then `payload`.
pub fn dicom_bytes(payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; DICOM_MAGIC_OFFSET as usize];
    bytes.extend_from_slice(b"DICM");
    bytes.extend_from_slice(payload);
    bytes
}

pub struct TestHarness {
    pub temp_dir: TempDir,
    pub staging_dir: PathBuf,
    pub store_root: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let staging_dir = temp_dir.path().join("staging");
        let store_root = temp_dir.path().join("store");
        fs::create_dir_all(&store_root).expect("Failed to create store root");

        Self {
            temp_dir,
            staging_dir,
            store_root,
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Small pools and millisecond backoff so failure paths run fast.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            download_workers: 2,
            upload_workers: 2,
            convert_workers: 2,
            download_timeout: Duration::from_secs(30),
            conversion_timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(30),
            retry: RetryPolicy::new(3, 2.0, false).with_delay_unit(Duration::from_millis(1)),
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 5,
                timeout_seconds: 60,
                success_threshold: 2,
            },
            staging_directory: self.staging_dir.clone(),
        }
    }

    /// Writes `content` under the store root, creating parent folders.
    pub fn create_store_file(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.store_root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create store folder");
        }
        fs::write(&path, content).expect("Failed to write store file");
        path
    }

    pub fn create_store_folder(&self, relative: &str) -> PathBuf {
        let path = self.store_root.join(relative);
        fs::create_dir_all(&path).expect("Failed to create store folder");
        path
    }

    pub fn write_config(&self, json: &str) -> PathBuf {
        let path = self.temp_dir.path().join("dicomflow.json");
        fs::write(&path, json).expect("Failed to write config file");
        path
    }

    /// Number of entries left directly inside the staging directory.
    pub fn staging_entries(&self) -> usize {
        match fs::read_dir(&self.staging_dir) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
