//! Plaintext host-directory backend.
//!
//! Maps volume paths onto a directory of the host filesystem. There is no
//! encryption here; it exists so the operation layer and the CLI can be
//! exercised against real files. Cryptographic engines plug in through the
//! same trait.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::UNIX_EPOCH;

use parking_lot::Mutex;
use tracing::{debug, instrument};

use super::handles::HandleTable;
use super::{DirEntry, EncryptedVolume, FileHandle, FileType, Stat, VolumeError, checked_path};
use crate::path;

#[derive(Debug)]
struct HostFile {
    file: Mutex<File>,
    writable: bool,
}

/// A volume backed by a host directory.
#[derive(Debug)]
pub struct HostVolume {
    root: PathBuf,
    handles: HandleTable<HostFile>,
    closed: AtomicBool,
}

fn stat_of(meta: &Metadata) -> Stat {
    let file_type = if meta.is_dir() {
        FileType::Directory
    } else if meta.file_type().is_symlink() {
        FileType::Symlink
    } else {
        FileType::RegularFile
    };
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
    let size = i64::try_from(meta.len()).unwrap_or(i64::MAX);
    Stat::new(file_type, size, mtime)
}

impl HostVolume {
    /// Open `root` as a volume. The directory must exist.
    #[instrument(level = "debug", skip(root), fields(root = %root.as_ref().display()))]
    pub fn open(root: impl AsRef<Path>) -> Result<Self, VolumeError> {
        let root = root.as_ref();
        let meta = fs::metadata(root).map_err(|e| VolumeError::io(root.display().to_string(), e))?;
        if !meta.is_dir() {
            return Err(VolumeError::NotADirectory {
                path: root.display().to_string(),
            });
        }
        debug!("Host volume opened");
        Ok(Self {
            root: root.to_path_buf(),
            handles: HandleTable::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn check_open(&self) -> Result<(), VolumeError> {
        if self.closed.load(Ordering::Acquire) {
            Err(VolumeError::Closed)
        } else {
            Ok(())
        }
    }

    /// Host path for a volume path, plus the normalized volume path.
    fn resolve(&self, raw: &str) -> Result<(PathBuf, String), VolumeError> {
        self.check_open()?;
        let key = checked_path(raw)?;
        let relative = key.trim_start_matches(path::SEPARATOR);
        Ok((self.root.join(relative), key))
    }

    fn with_file<T>(
        &self,
        handle: FileHandle,
        f: impl FnOnce(&mut File, bool) -> std::io::Result<T>,
    ) -> Result<T, VolumeError> {
        self.check_open()?;
        let open = self
            .handles
            .get(handle)
            .ok_or(VolumeError::InvalidHandle(handle))?;
        let mut file = open.file.lock();
        f(&mut file, open.writable).map_err(|e| VolumeError::io(handle.to_string(), e))
    }
}

impl EncryptedVolume for HostVolume {
    fn open_file_read_mode(&self, path: &str) -> Result<FileHandle, VolumeError> {
        let (host, key) = self.resolve(path)?;
        let file = File::open(&host).map_err(|e| VolumeError::io(&key, e))?;
        let meta = file.metadata().map_err(|e| VolumeError::io(&key, e))?;
        if meta.is_dir() {
            return Err(VolumeError::IsADirectory { path: key });
        }
        Ok(self.handles.insert(HostFile {
            file: Mutex::new(file),
            writable: false,
        }))
    }

    fn open_file_write_mode(&self, path: &str) -> Result<FileHandle, VolumeError> {
        let (host, key) = self.resolve(path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&host)
            .map_err(|e| VolumeError::io(&key, e))?;
        Ok(self.handles.insert(HostFile {
            file: Mutex::new(file),
            writable: true,
        }))
    }

    fn read(
        &self,
        handle: FileHandle,
        file_offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, VolumeError> {
        self.with_file(handle, |file, _| {
            file.seek(SeekFrom::Start(file_offset))?;
            file.read(buf)
        })
    }

    fn write(&self, handle: FileHandle, file_offset: u64, buf: &[u8]) -> Result<usize, VolumeError> {
        let mut read_only = false;
        let written = self.with_file(handle, |file, writable| {
            if !writable {
                read_only = true;
                return Ok(0);
            }
            file.seek(SeekFrom::Start(file_offset))?;
            file.write(buf)
        })?;
        if read_only {
            return Err(VolumeError::ReadOnlyHandle(handle));
        }
        Ok(written)
    }

    fn close_file(&self, handle: FileHandle) -> Result<(), VolumeError> {
        let open = self
            .handles
            .remove(handle)
            .ok_or(VolumeError::InvalidHandle(handle))?;
        if open.writable {
            open.file
                .into_inner()
                .sync_data()
                .map_err(|e| VolumeError::io(handle.to_string(), e))?;
        }
        Ok(())
    }

    fn truncate(&self, path: &str, size: u64) -> Result<(), VolumeError> {
        let (host, key) = self.resolve(path)?;
        OpenOptions::new()
            .write(true)
            .open(&host)
            .and_then(|f| f.set_len(size))
            .map_err(|e| VolumeError::io(key, e))
    }

    fn delete_file(&self, path: &str) -> Result<(), VolumeError> {
        let (host, key) = self.resolve(path)?;
        match fs::symlink_metadata(&host) {
            Ok(meta) if meta.is_dir() => Err(VolumeError::IsADirectory { path: key }),
            Ok(_) => fs::remove_file(&host).map_err(|e| VolumeError::io(key, e)),
            Err(e) => Err(VolumeError::io(key, e)),
        }
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, VolumeError> {
        let (host, key) = self.resolve(path)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&host).map_err(|e| VolumeError::io(&key, e))? {
            let entry = entry.map_err(|e| VolumeError::io(&key, e))?;
            let Ok(name) = entry.file_name().into_string() else {
                debug!(dir = %key, "Skipping non UTF-8 entry name");
                continue;
            };
            let meta = fs::symlink_metadata(entry.path())
                .map_err(|e| VolumeError::io(path::path_join(&[key.as_str(), name.as_str()]), e))?;
            entries.push(DirEntry::new(name, key.as_str(), stat_of(&meta)));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn mkdir(&self, path: &str) -> Result<(), VolumeError> {
        let (host, key) = self.resolve(path)?;
        fs::create_dir(&host).map_err(|e| VolumeError::io(key, e))
    }

    fn rmdir(&self, path: &str) -> Result<(), VolumeError> {
        let (host, key) = self.resolve(path)?;
        if key == path::ROOT {
            return Err(VolumeError::InvalidPath {
                path: key,
                reason: "cannot remove the root".into(),
            });
        }
        fs::remove_dir(&host).map_err(|e| VolumeError::io(key, e))
    }

    fn get_attr(&self, path: &str) -> Option<Stat> {
        let (host, _) = self.resolve(path).ok()?;
        fs::symlink_metadata(host).ok().map(|meta| stat_of(&meta))
    }

    fn rename(&self, src_path: &str, dst_path: &str) -> Result<(), VolumeError> {
        let (src, src_key) = self.resolve(src_path)?;
        let (dst, dst_key) = self.resolve(dst_path)?;
        if src_key != dst_key && path::is_child_of(&dst_key, &src_key) {
            return Err(VolumeError::InvalidPath {
                path: dst_key,
                reason: format!("cannot move {src_key} into itself"),
            });
        }
        fs::rename(&src, &dst).map_err(|e| VolumeError::io(src_key, e))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.handles.clear();
            debug!(root = %self.root.display(), "Host volume closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
