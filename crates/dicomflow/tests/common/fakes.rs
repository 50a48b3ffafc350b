//! In-memory stand-ins for the remote store and the converter.
//!
//! Both record what they were asked to do so tests can assert on call
//! counts, and both can be scripted to fail.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use dicomflow::dicom::{ConversionOutput, Converter};
use dicomflow::error::{ConvertError, StoreError};
use dicomflow::remote::{FileMetadata, ListPage, RemoteStore};

#[derive(Debug, Clone, Copy)]
enum ScriptedFailure {
    Times(u32),
    Always,
}

/// Consumes one scripted failure for `id`. `Always` fails with a 503 and
/// `Times` with a network error until it runs out.
fn take_failure(failures: &mut HashMap<String, ScriptedFailure>, id: &str) -> Option<StoreError> {
    match failures.get(id).copied() {
        Some(ScriptedFailure::Always) => Some(StoreError::Server {
            status: 503,
            message: "backend unavailable".to_string(),
        }),
        Some(ScriptedFailure::Times(n)) if n > 0 => {
            failures.insert(id.to_string(), ScriptedFailure::Times(n - 1));
            Some(StoreError::Network("connection reset".to_string()))
        }
        _ => None,
    }
}

#[derive(Default)]
struct StoreState {
    entries: Vec<FileMetadata>,
    contents: HashMap<String, Vec<u8>>,
    media_failures: HashMap<String, ScriptedFailure>,
    listing_failures: HashMap<String, ScriptedFailure>,
    list_calls: HashMap<String, u32>,
    upload_failure_suffix: Option<String>,
    get_media_calls: HashMap<String, u32>,
    find_folder_calls: Vec<(String, Option<String>)>,
    uploads: Vec<(String, String)>,
}

/// Folder tree held in memory. Listings are paged two entries at a time.
pub struct FakeStore {
    page_size: usize,
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            page_size: 2,
            state: Mutex::new(StoreState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().expect("fake store lock poisoned")
    }

    pub fn add_folder(&self, id: &str, name: &str, parent: Option<&str>) -> &Self {
        let parents = parent.map(|p| vec![p.to_string()]).unwrap_or_default();
        self.state()
            .entries
            .push(FileMetadata::folder(id, name, parents));
        self
    }

    pub fn add_file(&self, id: &str, name: &str, parent: &str, content: Vec<u8>) -> &Self {
        let mut state = self.state();
        state.entries.push(FileMetadata::file(
            id,
            name,
            content.len() as u64,
            vec![parent.to_string()],
        ));
        state.contents.insert(id.to_string(), content);
        drop(state);
        self
    }

    /// Adds `parent` as an extra parent of an existing entry.
    pub fn link(&self, id: &str, parent: &str) -> &Self {
        let mut state = self.state();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.id == id) {
            entry.parents.push(parent.to_string());
        }
        drop(state);
        self
    }

    /// The next `times` downloads of `id` fail with a transient error.
    pub fn fail_download(&self, id: &str, times: u32) -> &Self {
        self.state()
            .media_failures
            .insert(id.to_string(), ScriptedFailure::Times(times));
        self
    }

    pub fn fail_download_always(&self, id: &str) -> &Self {
        self.state()
            .media_failures
            .insert(id.to_string(), ScriptedFailure::Always);
        self
    }

    /// The first-page listing of `folder_id` fails `times` times with a
    /// network error.
    pub fn fail_listing(&self, folder_id: &str, times: u32) -> &Self {
        self.state()
            .listing_failures
            .insert(folder_id.to_string(), ScriptedFailure::Times(times));
        self
    }

    pub fn fail_listing_always(&self, folder_id: &str) -> &Self {
        self.state()
            .listing_failures
            .insert(folder_id.to_string(), ScriptedFailure::Always);
        self
    }

    /// Number of first-page listings requested for `folder_id`.
    pub fn list_calls(&self, folder_id: &str) -> u32 {
        self.state().list_calls.get(folder_id).copied().unwrap_or(0)
    }

    /// Uploads whose name ends with `suffix` are refused.
    pub fn fail_uploads_ending_with(&self, suffix: &str) -> &Self {
        self.state().upload_failure_suffix = Some(suffix.to_string());
        self
    }

    pub fn get_media_calls(&self, id: &str) -> u32 {
        self.state().get_media_calls.get(id).copied().unwrap_or(0)
    }

    pub fn total_get_media_calls(&self) -> u32 {
        self.state().get_media_calls.values().sum()
    }

    pub fn find_folder_calls(&self) -> Vec<(String, Option<String>)> {
        self.state().find_folder_calls.clone()
    }

    /// `(parent_id, name)` of every accepted upload, in arrival order.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.state().uploads.clone()
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.uploads().into_iter().map(|(_, n)| n).collect();
        names.sort();
        names
    }
}

impl Default for FakeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for FakeStore {
    fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let mut state = self.state();
        if page_token.is_none() {
            *state.list_calls.entry(folder_id.to_string()).or_insert(0) += 1;
            if let Some(e) = take_failure(&mut state.listing_failures, folder_id) {
                return Err(e);
            }
        }
        let children: Vec<FileMetadata> = state
            .entries
            .iter()
            .filter(|e| e.parents.iter().any(|p| p == folder_id))
            .cloned()
            .collect();

        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| StoreError::InvalidRequest(format!("bad token {}", token)))?,
            None => 0,
        };
        let end = (offset + self.page_size).min(children.len());
        let items = children.get(offset..end).unwrap_or_default().to_vec();
        let next_page_token = (end < children.len()).then(|| end.to_string());

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
        let mut state = self.state();
        state
            .find_folder_calls
            .push((name.to_string(), parent_id.map(str::to_string)));

        Ok(state
            .entries
            .iter()
            .filter(|e| e.is_folder() && e.name.eq_ignore_ascii_case(name))
            .filter(|e| parent_id.map_or(true, |p| e.parents.iter().any(|x| x == p)))
            .cloned()
            .collect())
    }

    fn get_media(&self, file_id: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let mut state = self.state();
        *state
            .get_media_calls
            .entry(file_id.to_string())
            .or_insert(0) += 1;

        if let Some(e) = take_failure(&mut state.media_failures, file_id) {
            return Err(e);
        }

        let content = state
            .contents
            .get(file_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(file_id.to_string()))?;
        Ok(Box::new(Cursor::new(content)))
    }

    fn create_media(
        &self,
        parent_id: &str,
        name: &str,
        local_path: &Path,
    ) -> Result<String, StoreError> {
        fs::metadata(local_path).map_err(|e| StoreError::io(local_path, e))?;

        let mut state = self.state();
        if let Some(suffix) = &state.upload_failure_suffix {
            if name.ends_with(suffix.as_str()) {
                return Err(StoreError::PermissionDenied(format!(
                    "quota exceeded for {}",
                    name
                )));
            }
        }

        state
            .uploads
            .push((parent_id.to_string(), name.to_string()));
        Ok(format!("uploaded-{}", state.uploads.len()))
    }
}

/// Converter that writes one volume and one sidecar named after the input
/// directory.
pub struct FakeConverter {
    fail_marker: Option<String>,
    calls: Mutex<Vec<(PathBuf, usize)>>,
}

impl FakeConverter {
    pub fn new() -> Self {
        Self {
            fail_marker: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fails any conversion whose input directory path contains `marker`.
    pub fn failing_for(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(input_dir, file_count)` for every conversion attempted.
    pub fn calls(&self) -> Vec<(PathBuf, usize)> {
        self.calls.lock().expect("fake converter lock poisoned").clone()
    }
}

impl Default for FakeConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for FakeConverter {
    fn convert(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        _timeout: Duration,
    ) -> Result<ConversionOutput, ConvertError> {
        let file_count = fs::read_dir(input_dir)
            .map_err(|_| ConvertError::InputMissing(input_dir.to_path_buf()))?
            .count();
        self.calls
            .lock()
            .expect("fake converter lock poisoned")
            .push((input_dir.to_path_buf(), file_count));

        if let Some(marker) = &self.fail_marker {
            if input_dir.to_string_lossy().contains(marker.as_str()) {
                return Err(ConvertError::Failed("corrupt series".to_string()));
            }
        }

        fs::create_dir_all(output_dir).map_err(|source| ConvertError::OutputDirectory {
            path: output_dir.to_path_buf(),
            source,
        })?;
        let stem = input_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "volume".to_string());
        for extension in ["nii.gz", "json"] {
            let path = output_dir.join(format!("{}.{}", stem, extension));
            fs::write(&path, b"converted").map_err(|source| ConvertError::OutputDirectory {
                path: path.clone(),
                source,
            })?;
        }

        Ok(ConversionOutput::collect(output_dir))
    }
}
