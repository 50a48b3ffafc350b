//! Remote store backed by a local directory tree, such as a synced drive
//! mount. Folder and file ids are paths relative to the store root, with
//! [`ROOT_ID`] naming the root itself. Relative ids never start with `/`,
//! so a folder of any name stays addressable.

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::StoreError;

use super::{FileMetadata, ListPage, RemoteStore, FOLDER_MIME_TYPE};

pub const ROOT_ID: &str = "/";

const DEFAULT_PAGE_SIZE: usize = 100;

pub struct FsStore {
    root: PathBuf,
    page_size: usize,
}

impl FsStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        if id == ROOT_ID || id.is_empty() {
            return Ok(self.root.clone());
        }

        let relative = Path::new(id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(StoreError::InvalidRequest(format!("invalid id '{}'", id)));
        }

        Ok(self.root.join(relative))
    }

    fn id_for(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ROOT_ID.to_string(),
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.to_string_lossy().to_string(),
        }
    }

    fn metadata_for(&self, path: &Path) -> Result<FileMetadata, StoreError> {
        let meta = fs::metadata(path).map_err(|e| map_io(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let parents = path
            .parent()
            .filter(|p| p.starts_with(&self.root))
            .map(|p| vec![self.id_for(p)])
            .unwrap_or_default();
        let modified_time = meta.modified().ok().map(DateTime::<Utc>::from);

        let (mime_type, size) = if meta.is_dir() {
            (FOLDER_MIME_TYPE.to_string(), None)
        } else {
            (guess_mime_type(path).to_string(), Some(meta.len()))
        };

        Ok(FileMetadata {
            id: self.id_for(path),
            name,
            mime_type,
            size,
            modified_time,
            parents,
        })
    }

    fn existing_dir(&self, id: &str) -> Result<PathBuf, StoreError> {
        let path = self.path_for(id)?;
        if !path.is_dir() {
            return Err(StoreError::NotFound(format!("folder '{}'", id)));
        }
        Ok(path)
    }
}

fn guess_mime_type(path: &Path) -> &'static str {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name.ends_with(".dcm") {
        "application/dicom"
    } else if name.ends_with(".nii.gz") || name.ends_with(".gz") {
        "application/gzip"
    } else if name.ends_with(".json") {
        "application/json"
    } else {
        "application/octet-stream"
    }
}

fn map_io(path: &Path, e: std::io::Error) -> StoreError {
    match e.kind() {
        std::io::ErrorKind::NotFound => StoreError::NotFound(path.display().to_string()),
        std::io::ErrorKind::PermissionDenied => {
            StoreError::PermissionDenied(path.display().to_string())
        }
        _ => StoreError::io(path, e),
    }
}

impl RemoteStore for FsStore {
    fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let dir = self.existing_dir(folder_id)?;
        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| StoreError::InvalidRequest(format!("bad page token '{}'", token)))?,
            None => 0,
        };

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| map_io(&dir, e))? {
            let entry = entry.map_err(|e| map_io(&dir, e))?;
            let file_type = entry.file_type().map_err(|e| map_io(&entry.path(), e))?;
            if file_type.is_symlink() {
                continue;
            }
            entries.push(entry.path());
        }
        entries.sort();

        let end = offset.saturating_add(self.page_size).min(entries.len());
        let items = entries
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|p| self.metadata_for(p))
            .collect::<Result<Vec<_>, _>>()?;
        let next_page_token = (end < entries.len()).then(|| end.to_string());

        debug!(folder_id, offset, count = items.len(), "Listed folder page");
        Ok(ListPage {
            items,
            next_page_token,
        })
    }

    fn find_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<FileMetadata>, StoreError> {
        let (search_root, max_depth) = match parent_id {
            Some(parent) => (self.existing_dir(parent)?, 1),
            None => (self.root.clone(), usize::MAX),
        };

        let mut found = Vec::new();
        for entry in WalkDir::new(&search_root)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_dir() {
                continue;
            }
            // Name lookups are case-insensitive, like the hosted store's.
            if entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
                found.push(self.metadata_for(entry.path())?);
            }
        }

        Ok(found)
    }

    fn get_media(&self, file_id: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let path = self.path_for(file_id)?;
        if path.is_dir() {
            return Err(StoreError::InvalidRequest(format!(
                "'{}' is a folder",
                file_id
            )));
        }
        let file = fs::File::open(&path).map_err(|e| map_io(&path, e))?;
        Ok(Box::new(file))
    }

    fn create_media(
        &self,
        parent_id: &str,
        name: &str,
        local_path: &Path,
    ) -> Result<String, StoreError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return Err(StoreError::InvalidRequest(format!("invalid name '{}'", name)));
        }
        let parent = self.existing_dir(parent_id)?;
        let dest = parent.join(name);
        fs::copy(local_path, &dest).map_err(|e| map_io(local_path, e))?;
        Ok(self.id_for(&dest))
    }
}
