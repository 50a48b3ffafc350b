//! Discovery of input files in the remote store, run once before a batch.

pub mod lister;
pub mod resolver;
pub mod studies;

pub use lister::RecursiveLister;
pub use resolver::{split_path, FolderResolver};
pub use studies::{discover_studies, StudyDescriptor};
