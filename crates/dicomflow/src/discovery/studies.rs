use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DiscoveryError;
use crate::remote::RemoteStore;

use super::lister::RecursiveLister;

/// One imaging study: a folder whose DICOM series are converted together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyDescriptor {
    pub name: String,
    pub study_number: String,
    /// Folder holding the study's DICOM files, possibly nested further.
    pub dicom_folder_id: String,
}

/// Treats every direct sub-folder of `root_folder_id` as a study.
///
/// A study's files are taken from its `DICOM` child folder (matched
/// case-insensitively) when it has one, otherwise from the study folder.
pub fn discover_studies<S: RemoteStore + ?Sized>(
    store: &S,
    root_folder_id: &str,
    max_results: usize,
) -> Result<Vec<StudyDescriptor>, DiscoveryError> {
    let lister = RecursiveLister::new(store);
    let study_folders = lister.list_subfolders(root_folder_id, max_results)?;

    let mut studies = Vec::with_capacity(study_folders.len());
    for folder in study_folders {
        let children = lister.list_subfolders(&folder.id, usize::MAX)?;
        let dicom_folder_id = children
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case("DICOM"))
            .map(|c| c.id.clone())
            .unwrap_or_else(|| folder.id.clone());

        debug!(study = %folder.name, dicom_folder_id = %dicom_folder_id, "Found study");
        studies.push(StudyDescriptor {
            study_number: study_number(&folder.name),
            name: folder.name,
            dicom_folder_id,
        });
    }

    info!(count = studies.len(), "Discovered studies");
    Ok(studies)
}

/// Leading digits of a study folder name, or the whole name when it has none.
pub fn study_number(name: &str) -> String {
    let digits: String = name
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        name.trim().to_string()
    } else {
        digits
    }
}
