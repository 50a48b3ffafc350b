use tracing::{debug, info, warn};

use crate::error::DiscoveryError;
use crate::remote::{FileMetadata, RemoteStore};

/// Resolves slash-delimited folder paths to folder ids, one segment at a time.
pub struct FolderResolver<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RemoteStore + ?Sized> FolderResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Resolves `path` (e.g. `"Exames/DICOM"`) to the id of its last folder.
    ///
    /// The first segment is looked up without a parent constraint; every
    /// later segment only among the previous folder's children. Nothing is
    /// cached between calls.
    pub fn resolve_path(&self, path: &str) -> Result<String, DiscoveryError> {
        let segments = split_path(path);
        if segments.is_empty() {
            return Err(DiscoveryError::EmptyPath);
        }

        let mut parent: Option<String> = None;
        for segment in &segments {
            let candidates = self
                .store
                .find_folder(segment, parent.as_deref())
                .map_err(|source| DiscoveryError::Listing {
                    folder_id: parent.clone().unwrap_or_else(|| "<any>".to_string()),
                    source,
                })?;

            let chosen = pick_candidate(segment, &candidates).ok_or_else(|| {
                warn!(path, segment, "Folder segment not found");
                DiscoveryError::FolderNotFound {
                    path: path.to_string(),
                    segment: segment.to_string(),
                }
            })?;

            debug!(segment, folder_id = %chosen.id, "Resolved folder segment");
            parent = Some(chosen.id.clone());
        }

        let folder_id = parent.ok_or(DiscoveryError::EmptyPath)?;
        info!(path, folder_id = %folder_id, "Resolved folder path");
        Ok(folder_id)
    }
}

/// Splits on `/`, dropping empty and whitespace-only segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Prefers an exact, case-sensitive name match; otherwise the first folder
/// the store returned. Non-folder candidates are ignored.
fn pick_candidate<'c>(name: &str, candidates: &'c [FileMetadata]) -> Option<&'c FileMetadata> {
    let folders: Vec<&FileMetadata> = candidates.iter().filter(|c| c.is_folder()).collect();
    if folders.len() > 1 {
        debug!(name, count = folders.len(), "Ambiguous folder name");
    }
    folders
        .iter()
        .find(|c| c.name == name)
        .or_else(|| folders.first())
        .copied()
}
