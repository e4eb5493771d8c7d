//! The encrypted volume capability.
//!
//! [`EncryptedVolume`] is the contract between oxvault and a cryptographic
//! engine that has already opened (unlocked) a container. It is intentionally
//! small: handle-based reads and writes plus the directory primitives. All
//! composite behaviour lives in [`VolumeExt`].
//!
//! # Thread Safety
//!
//! The trait requires `Send + Sync` and every method takes `&self`, so
//! implementations synchronise internally. That does not make concurrent use
//! a good idea: native engines are typically not reentrant, which is why the
//! operation layer funnels every call for one volume through a single worker.
//!
//! # Handles
//!
//! [`FileHandle`] is opaque. A handle is valid only on the volume that issued
//! it and only until [`EncryptedVolume::close_file`]; using it afterwards is a
//! caller bug. [`HandleGuard`], [`VolumeReader`] and [`VolumeWriter`] close
//! their handle on drop so that every exit path releases it.

mod derived;
mod handles;
mod host;
mod memory;
mod stat;
mod stream;

use std::fmt;
use std::io;

use thiserror::Error;

pub use derived::{DEFAULT_IO_CHUNK_SIZE, LoadError, MAX_KERNEL_WRITE, Removal, VolumeExt};
pub use handles::HandleTable;
pub use host::HostVolume;
pub use memory::MemoryVolume;
pub use stat::{FileType, Stat};
pub use stream::{
    ChunkCopyError, Copied, HandleGuard, TransferError, VolumeReader, VolumeWriter, copy_chunks,
};

use crate::path;

/// Opaque per-volume file handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(u64);

impl FileHandle {
    /// Wrap a backend handle value. Backends only.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Backend handle value. Backends only.
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fh#{}", self.0)
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    /// Directory the entry was listed from.
    pub parent_path: String,
    pub stat: Stat,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, parent_path: impl Into<String>, stat: Stat) -> Self {
        Self {
            name: name.into(),
            parent_path: parent_path.into(),
            stat,
        }
    }

    pub fn full_path(&self) -> String {
        path::path_join(&[self.parent_path.as_str(), self.name.as_str()])
    }

    pub fn is_directory(&self) -> bool {
        self.stat.is_directory()
    }

    pub fn is_regular_file(&self) -> bool {
        self.stat.is_regular_file()
    }

    pub fn is_parent_marker(&self) -> bool {
        self.stat.file_type == FileType::ParentMarker
    }
}

/// Errors reported by volume primitives.
#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("volume is closed")]
    Closed,

    #[error("no such file or directory: {path}")]
    NotFound { path: String },

    #[error("path already exists: {path}")]
    AlreadyExists { path: String },

    #[error("directory not empty: {path}")]
    NotEmpty { path: String },

    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    #[error("is a directory: {path}")]
    IsADirectory { path: String },

    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid file handle {0}")]
    InvalidHandle(FileHandle),

    #[error("file handle {0} is not open for writing")]
    ReadOnlyHandle(FileHandle),

    /// A write stored fewer bytes than requested.
    #[error("short write to {path} at offset {offset}: {written} of {expected} bytes")]
    ShortWrite {
        path: String,
        offset: u64,
        written: usize,
        expected: usize,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl VolumeError {
    /// Wrap an IO error, keeping the not-found / exists / not-empty kinds typed.
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => VolumeError::NotFound { path },
            io::ErrorKind::AlreadyExists => VolumeError::AlreadyExists { path },
            io::ErrorKind::DirectoryNotEmpty => VolumeError::NotEmpty { path },
            io::ErrorKind::NotADirectory => VolumeError::NotADirectory { path },
            io::ErrorKind::IsADirectory => VolumeError::IsADirectory { path },
            _ => VolumeError::Io { path, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VolumeError::NotFound { .. })
    }

    /// Closest `io::ErrorKind`, used when the error crosses an `io::Read`/`io::Write` boundary.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            VolumeError::Closed => io::ErrorKind::BrokenPipe,
            VolumeError::NotFound { .. } => io::ErrorKind::NotFound,
            VolumeError::AlreadyExists { .. } => io::ErrorKind::AlreadyExists,
            VolumeError::NotEmpty { .. } => io::ErrorKind::DirectoryNotEmpty,
            VolumeError::NotADirectory { .. } => io::ErrorKind::NotADirectory,
            VolumeError::IsADirectory { .. } => io::ErrorKind::IsADirectory,
            VolumeError::InvalidPath { .. }
            | VolumeError::InvalidHandle(_)
            | VolumeError::ReadOnlyHandle(_) => io::ErrorKind::InvalidInput,
            VolumeError::ShortWrite { .. } => io::ErrorKind::WriteZero,
            VolumeError::Io { source, .. } => source.kind(),
        }
    }
}

impl From<VolumeError> for io::Error {
    fn from(e: VolumeError) -> Self {
        io::Error::new(e.kind(), e)
    }
}

/// Normalize a volume path and reject `..` components.
pub(crate) fn checked_path(raw: &str) -> Result<String, VolumeError> {
    let normalized = path::normalize(raw);
    if normalized.split(path::SEPARATOR).any(|c| c == "..") {
        return Err(VolumeError::InvalidPath {
            path: raw.to_string(),
            reason: "parent references are not allowed".into(),
        });
    }
    Ok(normalized)
}

/// Handle-based file primitives against one opened container.
///
/// Paths are absolute volume paths (see [`crate::path`]).
pub trait EncryptedVolume: Send + Sync {
    /// Open an existing regular file for reading.
    fn open_file_read_mode(&self, path: &str) -> Result<FileHandle, VolumeError>;

    /// Open a file for writing, creating it if missing. Existing content is kept.
    fn open_file_write_mode(&self, path: &str) -> Result<FileHandle, VolumeError>;

    /// Read into `buf` starting at `file_offset`. `Ok(0)` means end of file.
    fn read(&self, handle: FileHandle, file_offset: u64, buf: &mut [u8])
    -> Result<usize, VolumeError>;

    /// Write `buf` at `file_offset`. May store fewer bytes than `buf.len()`.
    fn write(&self, handle: FileHandle, file_offset: u64, buf: &[u8]) -> Result<usize, VolumeError>;

    fn close_file(&self, handle: FileHandle) -> Result<(), VolumeError>;

    /// Set the length of the file at `path`.
    ///
    /// Some engines require the file to be open while it is truncated, so
    /// writers truncate before closing their handle.
    fn truncate(&self, path: &str, size: u64) -> Result<(), VolumeError>;

    fn delete_file(&self, path: &str) -> Result<(), VolumeError>;

    /// List a directory, sorted by name, without the parent marker.
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, VolumeError>;

    fn mkdir(&self, path: &str) -> Result<(), VolumeError>;

    /// Remove an empty directory.
    fn rmdir(&self, path: &str) -> Result<(), VolumeError>;

    /// Attributes of `path`, or `None` if it does not exist.
    fn get_attr(&self, path: &str) -> Option<Stat>;

    fn rename(&self, src_path: &str, dst_path: &str) -> Result<(), VolumeError>;

    /// Close the volume. Idempotent; afterwards every primitive fails with
    /// [`VolumeError::Closed`].
    fn close(&self);

    fn is_closed(&self) -> bool;
}
