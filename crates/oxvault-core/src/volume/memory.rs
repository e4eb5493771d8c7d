//! In-memory volume backend.
//!
//! Holds the whole tree in a `BTreeMap` keyed by normalized path. File
//! contents live behind their own lock so an open handle keeps working after
//! the file is renamed, the same way an open descriptor does on POSIX.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tracing::debug;

use super::handles::HandleTable;
use super::{
    DirEntry, EncryptedVolume, FileHandle, FileType, Stat, VolumeError, checked_path as key,
};
use crate::path;

#[derive(Debug, Default)]
struct FileData {
    bytes: Vec<u8>,
    mtime: i64,
}

#[derive(Debug, Clone)]
enum Node {
    Directory { mtime: i64 },
    File(Arc<RwLock<FileData>>),
}

impl Node {
    fn stat(&self) -> Stat {
        match self {
            Node::Directory { mtime } => Stat::new(FileType::Directory, 0, *mtime),
            Node::File(data) => {
                let data = data.read();
                let size = i64::try_from(data.bytes.len()).unwrap_or(i64::MAX);
                Stat::new(FileType::RegularFile, size, data.mtime)
            }
        }
    }

    fn is_directory(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }
}

#[derive(Debug)]
struct OpenFile {
    data: Arc<RwLock<FileData>>,
    writable: bool,
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// A volume whose whole tree lives in memory.
#[derive(Debug)]
pub struct MemoryVolume {
    nodes: RwLock<BTreeMap<String, Node>>,
    handles: HandleTable<OpenFile>,
    closed: AtomicBool,
}

impl Default for MemoryVolume {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryVolume {
    /// An empty volume containing only the root directory.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(path::ROOT.to_string(), Node::Directory { mtime: now() });
        Self {
            nodes: RwLock::new(nodes),
            handles: HandleTable::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Store `contents` at `path`, creating missing parent directories and
    /// replacing whatever was there. For seeding fixtures.
    pub fn put_file(&self, path: &str, contents: &[u8]) {
        let target = path::normalize(path);
        let mut nodes = self.nodes.write();
        let mut ancestor = path::parent_path(&target);
        let mut missing = Vec::new();
        while ancestor != path::ROOT {
            if nodes.get(&ancestor).is_some_and(Node::is_directory) {
                break;
            }
            missing.push(ancestor.clone());
            ancestor = path::parent_path(&ancestor);
        }
        for dir in missing.into_iter().rev() {
            nodes.insert(dir, Node::Directory { mtime: now() });
        }
        let data = FileData {
            bytes: contents.to_vec(),
            mtime: now(),
        };
        nodes.insert(target, Node::File(Arc::new(RwLock::new(data))));
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

    fn file_data(&self, path: &str) -> Result<Arc<RwLock<FileData>>, VolumeError> {
        let key = key(path)?;
        match self.nodes.read().get(&key) {
            Some(Node::File(data)) => Ok(Arc::clone(data)),
            Some(Node::Directory { .. }) => Err(VolumeError::IsADirectory { path: key }),
            None => Err(VolumeError::NotFound { path: key }),
        }
    }

    fn has_children(nodes: &BTreeMap<String, Node>, dir: &str) -> bool {
        nodes
            .keys()
            .any(|k| k != dir && path::is_child_of(k, dir))
    }

    fn require_parent_dir(nodes: &BTreeMap<String, Node>, key: &str) -> Result<(), VolumeError> {
        let parent = path::parent_path(key);
        match nodes.get(&parent) {
            Some(node) if node.is_directory() => Ok(()),
            Some(_) => Err(VolumeError::NotADirectory { path: parent }),
            None => Err(VolumeError::NotFound { path: parent }),
        }
    }
}

impl EncryptedVolume for MemoryVolume {
    fn open_file_read_mode(&self, path: &str) -> Result<FileHandle, VolumeError> {
        self.check_open()?;
        let data = self.file_data(path)?;
        Ok(self.handles.insert(OpenFile {
            data,
            writable: false,
        }))
    }

    fn open_file_write_mode(&self, path: &str) -> Result<FileHandle, VolumeError> {
        self.check_open()?;
        let key = key(path)?;
        let data = {
            let mut nodes = self.nodes.write();
            match nodes.get(&key) {
                Some(Node::File(data)) => Arc::clone(data),
                Some(Node::Directory { .. }) => {
                    return Err(VolumeError::IsADirectory { path: key });
                }
                None => {
                    Self::require_parent_dir(&nodes, &key)?;
                    let data = Arc::new(RwLock::new(FileData {
                        bytes: Vec::new(),
                        mtime: now(),
                    }));
                    nodes.insert(key, Node::File(Arc::clone(&data)));
                    data
                }
            }
        };
        Ok(self.handles.insert(OpenFile {
            data,
            writable: true,
        }))
    }

    fn read(
        &self,
        handle: FileHandle,
        file_offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, VolumeError> {
        self.check_open()?;
        let open = self
            .handles
            .get(handle)
            .ok_or(VolumeError::InvalidHandle(handle))?;
        let data = open.data.read();
        let Ok(start) = usize::try_from(file_offset) else {
            return Ok(0);
        };
        if start >= data.bytes.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.bytes.len() - start);
        buf[..n].copy_from_slice(&data.bytes[start..start + n]);
        Ok(n)
    }

    fn write(&self, handle: FileHandle, file_offset: u64, buf: &[u8]) -> Result<usize, VolumeError> {
        self.check_open()?;
        let open = self
            .handles
            .get(handle)
            .ok_or(VolumeError::InvalidHandle(handle))?;
        if !open.writable {
            return Err(VolumeError::ReadOnlyHandle(handle));
        }
        let out_of_range = || VolumeError::InvalidPath {
            path: handle.to_string(),
            reason: format!("offset {file_offset} out of range"),
        };
        let start = usize::try_from(file_offset).map_err(|_| out_of_range())?;
        let end = start.checked_add(buf.len()).ok_or_else(out_of_range)?;
        let mut data = open.data.write();
        if data.bytes.len() < end {
            data.bytes.resize(end, 0);
        }
        data.bytes[start..end].copy_from_slice(buf);
        data.mtime = now();
        Ok(buf.len())
    }

    fn close_file(&self, handle: FileHandle) -> Result<(), VolumeError> {
        self.handles
            .remove(handle)
            .map(|_| ())
            .ok_or(VolumeError::InvalidHandle(handle))
    }

    fn truncate(&self, path: &str, size: u64) -> Result<(), VolumeError> {
        self.check_open()?;
        let data = self.file_data(path)?;
        let size = usize::try_from(size).map_err(|_| VolumeError::InvalidPath {
            path: path.to_string(),
            reason: format!("size {size} out of range"),
        })?;
        let mut data = data.write();
        data.bytes.resize(size, 0);
        data.mtime = now();
        Ok(())
    }

    fn delete_file(&self, path: &str) -> Result<(), VolumeError> {
        self.check_open()?;
        let key = key(path)?;
        let mut nodes = self.nodes.write();
        match nodes.get(&key) {
            Some(Node::File(_)) => {
                nodes.remove(&key);
                Ok(())
            }
            Some(Node::Directory { .. }) => Err(VolumeError::IsADirectory { path: key }),
            None => Err(VolumeError::NotFound { path: key }),
        }
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, VolumeError> {
        self.check_open()?;
        let dir = key(path)?;
        let nodes = self.nodes.read();
        match nodes.get(&dir) {
            Some(node) if node.is_directory() => {}
            Some(_) => return Err(VolumeError::NotADirectory { path: dir }),
            None => return Err(VolumeError::NotFound { path: dir }),
        }
        let mut entries: Vec<DirEntry> = nodes
            .iter()
            .filter(|(k, _)| k.as_str() != dir && path::parent_path(k) == dir)
            .map(|(k, node)| DirEntry::new(path::file_name(k), dir.as_str(), node.stat()))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn mkdir(&self, path: &str) -> Result<(), VolumeError> {
        self.check_open()?;
        let key = key(path)?;
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&key) {
            return Err(VolumeError::AlreadyExists { path: key });
        }
        Self::require_parent_dir(&nodes, &key)?;
        nodes.insert(key, Node::Directory { mtime: now() });
        Ok(())
    }

    fn rmdir(&self, path: &str) -> Result<(), VolumeError> {
        self.check_open()?;
        let key = key(path)?;
        if key == path::ROOT {
            return Err(VolumeError::InvalidPath {
                path: key,
                reason: "cannot remove the root".into(),
            });
        }
        let mut nodes = self.nodes.write();
        match nodes.get(&key) {
            Some(Node::Directory { .. }) => {}
            Some(Node::File(_)) => return Err(VolumeError::NotADirectory { path: key }),
            None => return Err(VolumeError::NotFound { path: key }),
        }
        if Self::has_children(&nodes, &key) {
            return Err(VolumeError::NotEmpty { path: key });
        }
        nodes.remove(&key);
        Ok(())
    }

    fn get_attr(&self, path: &str) -> Option<Stat> {
        if self.check_open().is_err() {
            return None;
        }
        let key = key(path).ok()?;
        self.nodes.read().get(&key).map(Node::stat)
    }

    fn rename(&self, src_path: &str, dst_path: &str) -> Result<(), VolumeError> {
        self.check_open()?;
        let src = key(src_path)?;
        let dst = key(dst_path)?;
        if src == dst {
            return Ok(());
        }
        if src == path::ROOT || path::is_child_of(&dst, &src) {
            return Err(VolumeError::InvalidPath {
                path: dst,
                reason: format!("cannot move {src} into itself"),
            });
        }

        let mut nodes = self.nodes.write();
        let Some(node) = nodes.get(&src).cloned() else {
            return Err(VolumeError::NotFound { path: src });
        };
        Self::require_parent_dir(&nodes, &dst)?;
        match (node.is_directory(), nodes.get(&dst)) {
            (_, None) | (false, Some(Node::File(_))) => {}
            (false, Some(Node::Directory { .. })) => {
                return Err(VolumeError::IsADirectory { path: dst });
            }
            (true, Some(Node::File(_))) => return Err(VolumeError::NotADirectory { path: dst }),
            (true, Some(Node::Directory { .. })) => {
                if Self::has_children(&nodes, &dst) {
                    return Err(VolumeError::NotEmpty { path: dst });
                }
            }
        }

        let moved: Vec<String> = nodes
            .keys()
            .filter(|k| path::is_child_of(k, &src))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let rest = &old[src.len()..];
                nodes.insert(format!("{dst}{rest}"), node);
            }
        }
        debug!(src = %src, dst = %dst, "Renamed");
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.handles.clear();
            debug!("Memory volume closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
