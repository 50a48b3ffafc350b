use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::StagingError;

/// Local scratch space for one batch: downloads land in
/// `<root>/<task>/`, conversion output in `<root>/<task>_nifti/`.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn task_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn output_dir(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}_nifti", key))
    }

    pub fn ensure(&self) -> Result<(), StagingError> {
        ensure_directory(&self.root)
    }

    /// Creates (if needed) and returns the download directory for `key`.
    pub fn prepare_task_dir(&self, key: &str) -> Result<PathBuf, StagingError> {
        let dir = self.task_dir(key);
        ensure_directory(&dir)?;
        Ok(dir)
    }

    /// Writes everything from `reader` to `path`, creating parent directories.
    pub fn write_stream<R: io::Read + ?Sized>(
        &self,
        path: &Path,
        reader: &mut R,
    ) -> Result<u64, StagingError> {
        if let Some(parent) = path.parent() {
            ensure_directory(parent)?;
        }
        let mut file = fs::File::create(path).map_err(|e| StagingError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        io::copy(reader, &mut file).map_err(|e| StagingError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Removes everything under the staging root and returns how many files
    /// were deleted. The root itself is kept. Missing or empty roots yield 0.
    pub fn clean(&self) -> Result<usize, StagingError> {
        if !self.root.is_dir() {
            return Ok(0);
        }

        let entries = fs::read_dir(&self.root).map_err(|e| StagingError::Remove {
            path: self.root.clone(),
            source: e,
        })?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| StagingError::Remove {
                path: self.root.clone(),
                source: e,
            })?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| StagingError::Remove {
                path: path.clone(),
                source: e,
            })?;

            if file_type.is_dir() {
                let files = count_files(&path);
                fs::remove_dir_all(&path).map_err(|e| StagingError::Remove {
                    path: path.clone(),
                    source: e,
                })?;
                removed += files;
            } else {
                fs::remove_file(&path).map_err(|e| StagingError::Remove {
                    path: path.clone(),
                    source: e,
                })?;
                removed += 1;
            }
        }

        debug!(root = %self.root.display(), removed, "Staging area cleaned");
        Ok(removed)
    }
}

fn ensure_directory(path: &Path) -> Result<(), StagingError> {
    fs::create_dir_all(path).map_err(|e| StagingError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })
}

fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_type().is_dir())
        .count()
}
