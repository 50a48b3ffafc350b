//! DICOM detection by magic number, independent of file extension.
//!
//! A DICOM Part 10 file starts with a 128-byte preamble followed by the
//! four bytes `DICM`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

pub const DICOM_MAGIC_OFFSET: u64 = 128;
pub const DICOM_MAGIC: &[u8; 4] = b"DICM";
pub const MIN_DICOM_SIZE: u64 = DICOM_MAGIC_OFFSET + DICOM_MAGIC.len() as u64;

pub fn has_dicom_signature(bytes: &[u8]) -> bool {
    let start = DICOM_MAGIC_OFFSET as usize;
    bytes
        .get(start..start + DICOM_MAGIC.len())
        .is_some_and(|magic| magic == DICOM_MAGIC)
}

/// Unreadable, missing and too-small files are not DICOM.
pub fn is_dicom_file(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() || meta.len() < MIN_DICOM_SIZE {
        return false;
    }

    let mut magic = [0u8; 4];
    let read = File::open(path).and_then(|mut f| {
        f.seek(SeekFrom::Start(DICOM_MAGIC_OFFSET))?;
        f.read_exact(&mut magic)
    });

    read.is_ok() && &magic == DICOM_MAGIC
}

/// All DICOM files anywhere under `directory`, in path order.
pub fn find_dicom_files(directory: &Path) -> Vec<PathBuf> {
    if !directory.is_dir() {
        return Vec::new();
    }

    let found: Vec<PathBuf> = WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_dicom_file(p))
        .collect();

    debug!(count = found.len(), directory = %directory.display(), "Scanned for DICOM files");
    found
}
