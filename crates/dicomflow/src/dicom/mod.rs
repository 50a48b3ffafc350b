//! DICOM-specific collaborators: signature detection and conversion.

pub mod converter;
pub mod detector;

pub use converter::{ConversionOutput, Converter, Dcm2Niix};
pub use detector::{find_dicom_files, has_dicom_signature, is_dicom_file};
