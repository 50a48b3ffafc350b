//! Narrow interface onto the remote hierarchical file store.

pub mod fs_store;
pub mod rate_limited;

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use fs_store::FsStore;
pub use rate_limited::RateLimitedStore;

/// MIME type the store uses to tag folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Metadata for one entry (file or folder) in the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Size in bytes; folders and some native documents have none.
    pub size: Option<u64>,
    pub modified_time: Option<DateTime<Utc>>,
    pub parents: Vec<String>,
}

impl FileMetadata {
    pub fn folder(id: impl Into<String>, name: impl Into<String>, parents: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            size: None,
            modified_time: None,
            parents,
        }
    }

    pub fn file(
        id: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        parents: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: "application/octet-stream".to_string(),
            size: Some(size),
            modified_time: None,
            parents,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    pub fn size_mb(&self) -> f64 {
        self.size.unwrap_or(0) as f64 / (1024.0 * 1024.0)
    }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub items: Vec<FileMetadata>,
    pub next_page_token: Option<String>,
}

/// Operations the pipeline needs from the remote store.
///
/// Implementations are shared across worker threads.
pub trait RemoteStore: Send + Sync {
    /// Lists the direct children of `folder_id`, one page at a time.
    fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, StoreError>;

    /// Finds folders named `name`, optionally only directly under `parent_id`.
    fn find_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<FileMetadata>, StoreError>;

    /// Opens the content of `file_id` for reading.
    fn get_media(&self, file_id: &str) -> Result<Box<dyn Read + Send>, StoreError>;

    /// Uploads `local_path` as `name` into `parent_id`, returning the new id.
    fn create_media(
        &self,
        parent_id: &str,
        name: &str,
        local_path: &Path,
    ) -> Result<String, StoreError>;
}

impl<S: RemoteStore + ?Sized> RemoteStore for std::sync::Arc<S> {
    fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        (**self).list_children(folder_id, page_token)
    }

    fn find_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<FileMetadata>, StoreError> {
        (**self).find_folder(name, parent_id)
    }

    fn get_media(&self, file_id: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        (**self).get_media(file_id)
    }

    fn create_media(
        &self,
        parent_id: &str,
        name: &str,
        local_path: &Path,
    ) -> Result<String, StoreError> {
        (**self).create_media(parent_id, name, local_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_detection() {
        let folder = FileMetadata::folder("f1", "DICOM", vec![]);
        let file = FileMetadata::file("x1", "IM0001", 10, vec!["f1".to_string()]);
        assert!(folder.is_folder());
        assert!(!file.is_folder());
    }

    #[test]
    fn test_size_mb() {
        let file = FileMetadata::file("x1", "IM0001", 3 * 1024 * 1024, vec![]);
        assert!((file.size_mb() - 3.0).abs() < f64::EPSILON);
        assert_eq!(FileMetadata::folder("f", "f", vec![]).size_mb(), 0.0);
    }
}
