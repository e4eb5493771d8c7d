//! Composite operations built from volume primitives.

use std::io::{Read, Write};

use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use super::stream::{HandleGuard, TransferError, VolumeReader, VolumeWriter, copy_chunks};
use super::{DirEntry, EncryptedVolume, VolumeError};
use crate::path;

/// Chunk size for streaming transfers.
pub const DEFAULT_IO_CHUNK_SIZE: usize = 16 * 1024;

/// Largest single write some kernel bridges accept; upper bound for chunk sizes.
pub const MAX_KERNEL_WRITE: usize = 128 * 1024;

/// Failure of [`VolumeExt::load_whole_file`].
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("file {path} is {size} bytes, over the {max} byte limit")]
    TooLarge { path: String, size: u64, max: u64 },

    #[error("cannot stat {path}")]
    StatFailed { path: String },

    #[error("cannot open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: VolumeError,
    },

    #[error("not enough memory to load {path} ({size} bytes)")]
    OutOfMemory { path: String, size: u64 },

    #[error("read of {path} failed: {source}")]
    Read {
        path: String,
        #[source]
        source: VolumeError,
    },

    #[error("short read of {path}: got {read} of {expected} bytes")]
    ShortRead {
        path: String,
        read: usize,
        expected: usize,
    },
}

/// Outcome of a cancellable recursive removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    Removed,
    /// First path that could not be removed.
    Failed(String),
    /// Stop was requested; whatever was removed stays removed.
    Stopped,
}

/// Derived operations available on every [`EncryptedVolume`].
pub trait VolumeExt: EncryptedVolume {
    fn path_exists(&self, path: &str) -> bool {
        self.get_attr(path).is_some()
    }

    /// Stream a volume file into `sink`. Returns the number of bytes copied.
    ///
    /// The read handle is closed and `sink` dropped on every exit path.
    fn export_file<W: Write>(&self, path: &str, mut sink: W) -> Result<u64, TransferError> {
        let mut reader = VolumeReader::open(self, path)?;
        let mut buf = vec![0_u8; DEFAULT_IO_CHUNK_SIZE];
        let copied = copy_chunks(&mut reader, &mut sink, &mut buf, || false)?;
        reader.close()?;
        Ok(copied.bytes())
    }

    /// Stream `source` into a volume file, creating it if needed.
    ///
    /// The destination ends up exactly as long as the bytes confirmed written,
    /// including after a short write.
    fn import_file<R: Read>(&self, mut source: R, path: &str) -> Result<u64, TransferError> {
        let mut writer = VolumeWriter::create(self, path)?;
        let mut buf = vec![0_u8; DEFAULT_IO_CHUNK_SIZE];
        let copied = copy_chunks(&mut source, &mut writer, &mut buf, || false);
        let finished = writer.finish();
        let copied = copied?;
        finished?;
        Ok(copied.bytes())
    }

    /// Read a whole file into memory.
    ///
    /// The size is checked against `max_size` before anything is read.
    #[instrument(level = "debug", skip(self))]
    fn load_whole_file(&self, path: &str, max_size: Option<u64>) -> Result<Vec<u8>, LoadError> {
        let stat = self.get_attr(path).ok_or_else(|| LoadError::StatFailed {
            path: path.to_string(),
        })?;
        let size = stat.len();
        if let Some(max) = max_size
            && size > max
        {
            return Err(LoadError::TooLarge {
                path: path.to_string(),
                size,
                max,
            });
        }

        let out_of_memory = || LoadError::OutOfMemory {
            path: path.to_string(),
            size,
        };
        let expected = usize::try_from(size).map_err(|_| out_of_memory())?;
        let mut data = Vec::new();
        data.try_reserve_exact(expected)
            .map_err(|_| out_of_memory())?;
        data.resize(expected, 0);

        let handle = self
            .open_file_read_mode(path)
            .map_err(|source| LoadError::OpenFailed {
                path: path.to_string(),
                source,
            })?;
        let guard = HandleGuard::new(self, handle);

        let mut filled = 0;
        while filled < expected {
            let n = self
                .read(handle, filled as u64, &mut data[filled..])
                .map_err(|source| LoadError::Read {
                    path: path.to_string(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        drop(guard);

        if filled < expected {
            return Err(LoadError::ShortRead {
                path: path.to_string(),
                read: filled,
                expected,
            });
        }
        Ok(data)
    }

    /// Depth-first listing of everything below `root`, parents before children.
    ///
    /// Returns `None` if any directory cannot be listed.
    fn recursive_map_files(&self, root: &str) -> Option<Vec<DirEntry>> {
        let mut out = Vec::new();
        if let Err(e) = map_into(self, root, &mut out) {
            warn!(root, error = %e, "Recursive listing failed");
            return None;
        }
        Some(out)
    }

    /// Delete a directory and everything below it, children first.
    ///
    /// Returns the first path that failed to delete, or `None` on success.
    fn recursive_remove_directory(&self, path: &str) -> Option<String> {
        match self.remove_tree_until(path, &|| false) {
            Removal::Removed | Removal::Stopped => None,
            Removal::Failed(failed) => Some(failed),
        }
    }

    /// Remove a file, or a directory tree children first, checking
    /// `should_stop` before each entry.
    #[instrument(level = "debug", skip(self, should_stop))]
    fn remove_tree_until(&self, path: &str, should_stop: &dyn Fn() -> bool) -> Removal {
        let Some(stat) = self.get_attr(path) else {
            return Removal::Failed(path.to_string());
        };
        if !stat.is_directory() {
            return match self.delete_file(path) {
                Ok(()) => Removal::Removed,
                Err(e) => {
                    debug!(path, error = %e, "delete_file failed");
                    Removal::Failed(path.to_string())
                }
            };
        }

        let entries = match self.read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path, error = %e, "read_dir failed");
                return Removal::Failed(path.to_string());
            }
        };
        for entry in entries.iter().filter(|e| !e.is_parent_marker()) {
            if should_stop() {
                return Removal::Stopped;
            }
            let child = entry.full_path();
            match self.remove_tree_until(&child, should_stop) {
                Removal::Removed => trace!(path = %child, "Removed"),
                other => return other,
            }
        }
        match self.rmdir(path) {
            Ok(()) => Removal::Removed,
            Err(e) => {
                debug!(path, error = %e, "rmdir failed");
                Removal::Failed(path.to_string())
            }
        }
    }
}

impl<V: EncryptedVolume + ?Sized> VolumeExt for V {}

fn map_into<V: EncryptedVolume + ?Sized>(
    volume: &V,
    dir: &str,
    out: &mut Vec<DirEntry>,
) -> Result<(), VolumeError> {
    for entry in volume.read_dir(dir)? {
        if entry.is_parent_marker() {
            continue;
        }
        let is_dir = entry.is_directory();
        let child = path::path_join(&[dir, entry.name.as_str()]);
        out.push(entry);
        if is_dir {
            map_into(volume, &child, out)?;
        }
    }
    Ok(())
}
