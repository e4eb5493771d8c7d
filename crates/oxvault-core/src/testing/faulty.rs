//! Fault-injecting volume wrapper.
//!
//! # Example
//!
//! ```
//! use oxvault_core::testing::{Fault, FaultyVolume};
//! use oxvault_core::{EncryptedVolume, MemoryVolume, VolumeExt};
//!
//! let volume = FaultyVolume::new(MemoryVolume::new())
//!     .with_short_write("/a.txt", 3)
//!     .with_failure(Fault::Mkdir, "/locked");
//!
//! assert!(volume.import_file(&b"abcdef"[..], "/a.txt").is_err());
//! assert_eq!(volume.get_attr("/a.txt").unwrap().size, 0);
//! assert!(volume.mkdir("/locked").is_err());
//! ```

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::path;
use crate::volume::{DirEntry, EncryptedVolume, FileHandle, Stat, VolumeError};

/// Primitive that can be made to fail for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    OpenRead,
    OpenWrite,
    Read,
    Truncate,
    Delete,
    ReadDir,
    Mkdir,
    Rmdir,
    /// Matches on the source path.
    Rename,
}

/// Wraps a volume and misbehaves on request.
#[derive(Debug)]
pub struct FaultyVolume<V> {
    inner: V,
    /// Path -> offset past which writes are cut short.
    short_writes: HashMap<String, u64>,
    /// Path -> offset at which reads report end of file.
    short_reads: HashMap<String, u64>,
    /// Path -> size reported by `get_attr` in place of the real one.
    reported_sizes: HashMap<String, i64>,
    failures: HashMap<Fault, HashSet<String>>,
    handle_paths: DashMap<FileHandle, String>,
    delay: Option<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
}

struct CallGuard<'a> {
    active: &'a AtomicUsize,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn injected(path: &str, what: &str) -> VolumeError {
    VolumeError::Io {
        path: path.to_string(),
        source: io::Error::other(format!("injected {what} fault")),
    }
}

impl<V: EncryptedVolume> FaultyVolume<V> {
    pub fn new(inner: V) -> Self {
        Self {
            inner,
            short_writes: HashMap::new(),
            short_reads: HashMap::new(),
            reported_sizes: HashMap::new(),
            failures: HashMap::new(),
            handle_paths: DashMap::new(),
            delay: None,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Writes to `path` store nothing past byte `at` and report a short count.
    #[must_use]
    pub fn with_short_write(mut self, path: &str, at: u64) -> Self {
        self.short_writes.insert(path::normalize(path), at);
        self
    }

    /// Reads of `path` hit end of file at byte `at`, whatever its real size.
    #[must_use]
    pub fn with_short_read(mut self, path: &str, at: u64) -> Self {
        self.short_reads.insert(path::normalize(path), at);
        self
    }

    /// `get_attr` reports `size` for `path`.
    #[must_use]
    pub fn with_reported_size(mut self, path: &str, size: i64) -> Self {
        self.reported_sizes.insert(path::normalize(path), size);
        self
    }

    #[must_use]
    pub fn with_failure(mut self, fault: Fault, path: &str) -> Self {
        self.failures
            .entry(fault)
            .or_default()
            .insert(path::normalize(path));
        self
    }

    /// Sleep inside every primitive, widening any overlap between callers.
    #[must_use]
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn inner(&self) -> &V {
        &self.inner
    }

    /// Largest number of primitives observed running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Total primitive calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> CallGuard<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        CallGuard {
            active: &self.active,
        }
    }

    fn check(&self, fault: Fault, path: &str) -> Result<(), VolumeError> {
        let key = path::normalize(path);
        if self
            .failures
            .get(&fault)
            .is_some_and(|paths| paths.contains(&key))
        {
            debug!(?fault, path = %key, "Injecting fault");
            return Err(injected(&key, &format!("{fault:?}")));
        }
        Ok(())
    }

    fn handle_path(&self, handle: FileHandle) -> Option<String> {
        self.handle_paths.get(&handle).map(|p| p.clone())
    }
}

impl<V: EncryptedVolume> EncryptedVolume for FaultyVolume<V> {
    fn open_file_read_mode(&self, path: &str) -> Result<FileHandle, VolumeError> {
        let _call = self.enter();
        self.check(Fault::OpenRead, path)?;
        let handle = self.inner.open_file_read_mode(path)?;
        self.handle_paths.insert(handle, path::normalize(path));
        Ok(handle)
    }

    fn open_file_write_mode(&self, path: &str) -> Result<FileHandle, VolumeError> {
        let _call = self.enter();
        self.check(Fault::OpenWrite, path)?;
        let handle = self.inner.open_file_write_mode(path)?;
        self.handle_paths.insert(handle, path::normalize(path));
        Ok(handle)
    }

    fn read(
        &self,
        handle: FileHandle,
        file_offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, VolumeError> {
        let _call = self.enter();
        let Some(path) = self.handle_path(handle) else {
            return self.inner.read(handle, file_offset, buf);
        };
        self.check(Fault::Read, &path)?;
        let Some(&at) = self.short_reads.get(&path) else {
            return self.inner.read(handle, file_offset, buf);
        };
        let allowed = usize::try_from(at.saturating_sub(file_offset)).unwrap_or(usize::MAX);
        if allowed == 0 {
            debug!(%handle, file_offset, "Injecting short read");
            return Ok(0);
        }
        let end = allowed.min(buf.len());
        self.inner.read(handle, file_offset, &mut buf[..end])
    }

    fn write(&self, handle: FileHandle, file_offset: u64, buf: &[u8]) -> Result<usize, VolumeError> {
        let _call = self.enter();
        let limit = self
            .handle_path(handle)
            .and_then(|path| self.short_writes.get(&path).copied());
        let Some(at) = limit else {
            return self.inner.write(handle, file_offset, buf);
        };
        let end = file_offset + buf.len() as u64;
        if end <= at {
            return self.inner.write(handle, file_offset, buf);
        }
        let allowed = usize::try_from(at.saturating_sub(file_offset)).unwrap_or(0);
        debug!(%handle, file_offset, allowed, requested = buf.len(), "Injecting short write");
        if allowed == 0 {
            return Ok(0);
        }
        self.inner.write(handle, file_offset, &buf[..allowed])
    }

    fn close_file(&self, handle: FileHandle) -> Result<(), VolumeError> {
        let _call = self.enter();
        self.handle_paths.remove(&handle);
        self.inner.close_file(handle)
    }

    fn truncate(&self, path: &str, size: u64) -> Result<(), VolumeError> {
        let _call = self.enter();
        self.check(Fault::Truncate, path)?;
        self.inner.truncate(path, size)
    }

    fn delete_file(&self, path: &str) -> Result<(), VolumeError> {
        let _call = self.enter();
        self.check(Fault::Delete, path)?;
        self.inner.delete_file(path)
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, VolumeError> {
        let _call = self.enter();
        self.check(Fault::ReadDir, path)?;
        self.inner.read_dir(path)
    }

    fn mkdir(&self, path: &str) -> Result<(), VolumeError> {
        let _call = self.enter();
        self.check(Fault::Mkdir, path)?;
        self.inner.mkdir(path)
    }

    fn rmdir(&self, path: &str) -> Result<(), VolumeError> {
        let _call = self.enter();
        self.check(Fault::Rmdir, path)?;
        self.inner.rmdir(path)
    }

    fn get_attr(&self, path: &str) -> Option<Stat> {
        let _call = self.enter();
        let mut stat = self.inner.get_attr(path)?;
        if let Some(&size) = self.reported_sizes.get(&path::normalize(path)) {
            stat.size = size;
        }
        Some(stat)
    }

    fn rename(&self, src_path: &str, dst_path: &str) -> Result<(), VolumeError> {
        let _call = self.enter();
        self.check(Fault::Rename, src_path)?;
        self.inner.rename(src_path, dst_path)
    }

    fn close(&self) {
        self.handle_paths.clear();
        self.inner.close();
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
