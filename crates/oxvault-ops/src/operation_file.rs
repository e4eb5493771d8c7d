//! Planned units of work.

use oxvault_core::path;
use oxvault_core::{DirEntry, FileType};

/// One item of a bulk operation, produced by flattening a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFile {
    pub src_path: String,
    /// Where the item goes. Unused by deletion.
    pub dst_path: Option<String>,
    pub file_type: FileType,
    /// The caller agreed to replace an existing destination.
    pub overwrite_confirmed: bool,
}

impl OperationFile {
    pub fn new(src_path: impl Into<String>, file_type: FileType) -> Self {
        Self {
            src_path: src_path.into(),
            dst_path: None,
            file_type,
            overwrite_confirmed: false,
        }
    }

    pub fn from_entry(entry: &DirEntry) -> Self {
        Self::new(entry.full_path(), entry.stat.file_type)
    }

    #[must_use]
    pub fn with_dst(mut self, dst_path: impl Into<String>) -> Self {
        self.dst_path = Some(dst_path.into());
        self
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn name(&self) -> &str {
        path::file_name(&self.src_path)
    }

    pub fn confirm_overwrite(&mut self) {
        self.overwrite_confirmed = true;
    }
}
