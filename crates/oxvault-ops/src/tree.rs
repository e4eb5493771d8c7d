//! Tree capabilities and the one routine that copies between them.
//!
//! Import, export and whole-volume copies all move a tree of directories and
//! files from a [`TreeSource`] into a [`TreeSink`]. Volume paths
//! ([`VolumeNode`]) and external trees ([`ExternalTree`], e.g. [`HostNode`])
//! implement both sides, so the walk exists once for every direction.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use oxvault_core::path;
use oxvault_core::{
    Copied, EncryptedVolume, Stat, VolumeError, VolumeReader, VolumeWriter, copy_chunks,
};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::EngineError;

/// An external directory tree (outside any volume) that can be read from
/// and written into.
pub trait ExternalTree: Send + Sync {
    /// Stable identifier reported in failures (a path or URI).
    fn id(&self) -> String;

    fn name(&self) -> String;

    fn is_directory(&self) -> bool;

    fn list_children(&self) -> io::Result<Vec<Box<dyn ExternalTree>>>;

    /// Create (or replace) a file named `name` in this directory.
    fn create_file(&self, name: &str) -> io::Result<Box<dyn Write + Send>>;

    /// Create a subdirectory, or return the existing one.
    fn create_directory(&self, name: &str) -> io::Result<Box<dyn ExternalTree>>;

    fn open_for_read(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// An external file that can be securely wiped.
pub trait Wipeable: Send + Sync {
    fn id(&self) -> String;

    /// Current content length.
    fn size(&self) -> io::Result<u64>;

    /// Writer positioned at offset 0 that does not truncate.
    fn open_for_overwrite(&self) -> io::Result<Box<dyn Write + Send>>;

    /// Remove the item. May fail with [`io::ErrorKind::Unsupported`].
    fn delete(&self) -> io::Result<()>;

    /// Cut the content to zero length.
    fn truncate(&self) -> io::Result<()>;
}

/// Read side of a tree copy.
pub trait TreeSource: Sized {
    type Reader: Read;

    fn id(&self) -> String;
    fn name(&self) -> String;
    fn is_directory(&self) -> bool;
    fn children(&self) -> io::Result<Vec<Self>>;
    fn open(&self) -> io::Result<Self::Reader>;
}

/// Write side of a tree copy. A sink value is a directory.
pub trait TreeSink: Sized {
    type Writer: Write;

    fn create_file(&self, name: &str) -> io::Result<Self::Writer>;
    fn create_directory(&self, name: &str) -> io::Result<Self>;

    /// Settle a writer, whether or not the copy completed.
    fn finish_file(&self, writer: Self::Writer) -> io::Result<()>;
}

impl TreeSource for Box<dyn ExternalTree> {
    type Reader = Box<dyn Read + Send>;

    fn id(&self) -> String {
        self.as_ref().id()
    }

    fn name(&self) -> String {
        self.as_ref().name()
    }

    fn is_directory(&self) -> bool {
        self.as_ref().is_directory()
    }

    fn children(&self) -> io::Result<Vec<Self>> {
        self.list_children()
    }

    fn open(&self) -> io::Result<Self::Reader> {
        self.open_for_read()
    }
}

impl TreeSink for Box<dyn ExternalTree> {
    type Writer = Box<dyn Write + Send>;

    fn create_file(&self, name: &str) -> io::Result<Self::Writer> {
        self.as_ref().create_file(name)
    }

    fn create_directory(&self, name: &str) -> io::Result<Self> {
        self.as_ref().create_directory(name)
    }

    fn finish_file(&self, mut writer: Self::Writer) -> io::Result<()> {
        writer.flush()
    }
}

/// A file or directory inside a volume.
pub struct VolumeNode<'a, V: EncryptedVolume + ?Sized> {
    volume: &'a V,
    path: String,
    stat: Stat,
}

impl<'a, V: EncryptedVolume + ?Sized> VolumeNode<'a, V> {
    pub fn open(volume: &'a V, path: &str) -> Result<Self, VolumeError> {
        let path = path::normalize(path);
        let stat = volume
            .get_attr(&path)
            .ok_or_else(|| VolumeError::NotFound { path: path.clone() })?;
        Ok(Self { volume, path, stat })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<'a, V: EncryptedVolume + ?Sized> TreeSource for VolumeNode<'a, V> {
    type Reader = VolumeReader<'a, V>;

    fn id(&self) -> String {
        self.path.clone()
    }

    fn name(&self) -> String {
        path::file_name(&self.path).to_string()
    }

    fn is_directory(&self) -> bool {
        self.stat.is_directory()
    }

    fn children(&self) -> io::Result<Vec<Self>> {
        Ok(self
            .volume
            .read_dir(&self.path)?
            .into_iter()
            .filter(|e| !e.is_parent_marker())
            .map(|e| VolumeNode {
                volume: self.volume,
                path: e.full_path(),
                stat: e.stat,
            })
            .collect())
    }

    fn open(&self) -> io::Result<Self::Reader> {
        Ok(VolumeReader::open(self.volume, &self.path)?)
    }
}

impl<'a, V: EncryptedVolume + ?Sized> TreeSink for VolumeNode<'a, V> {
    type Writer = VolumeWriter<'a, V>;

    fn create_file(&self, name: &str) -> io::Result<Self::Writer> {
        let target = path::path_join(&[self.path.as_str(), name]);
        Ok(VolumeWriter::create(self.volume, &target)?)
    }

    fn create_directory(&self, name: &str) -> io::Result<Self> {
        let target = path::path_join(&[self.path.as_str(), name]);
        if !self.volume.get_attr(&target).is_some_and(|s| s.is_directory()) {
            self.volume.mkdir(&target)?;
        }
        Ok(VolumeNode::open(self.volume, &target)?)
    }

    fn finish_file(&self, writer: Self::Writer) -> io::Result<()> {
        writer.finish()?;
        Ok(())
    }
}

/// How a tree copy ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeOutcome {
    Complete,
    Cancelled,
    /// Id of the first source node that could not be copied.
    Failed(String),
}

/// Copies trees node by node, honouring a cancellation token.
pub struct TreeCopier<'a> {
    buf: Vec<u8>,
    token: &'a CancelToken,
    on_item: &'a mut dyn FnMut(),
}

impl<'a> TreeCopier<'a> {
    /// `on_item` is called after every node (directory or file) is copied.
    pub fn new(chunk_size: usize, token: &'a CancelToken, on_item: &'a mut dyn FnMut()) -> Self {
        Self {
            buf: vec![0; chunk_size.max(1)],
            token,
            on_item,
        }
    }

    /// Copy `source` into the directory `parent`, keeping its name.
    pub fn copy_into<S: TreeSource, D: TreeSink>(&mut self, source: &S, parent: &D) -> TreeOutcome {
        if source.is_directory() {
            self.copy_dir(source, parent).0
        } else {
            self.copy_file(source, parent)
        }
    }

    /// Copy the directory `source` into `parent` and return the directory
    /// created for it, also when a descendant failed.
    pub fn copy_dir<S: TreeSource, D: TreeSink>(
        &mut self,
        source: &S,
        parent: &D,
    ) -> (TreeOutcome, Option<D>) {
        if self.token.is_cancelled() {
            return (TreeOutcome::Cancelled, None);
        }
        let dir = match parent.create_directory(&source.name()) {
            Ok(dir) => dir,
            Err(e) => {
                warn!(source = %source.id(), error = %e, "Failed to create directory");
                return (TreeOutcome::Failed(source.id()), None);
            }
        };
        let children = match source.children() {
            Ok(children) => children,
            Err(e) => {
                warn!(source = %source.id(), error = %e, "Failed to list directory");
                return (TreeOutcome::Failed(source.id()), Some(dir));
            }
        };
        (self.on_item)();
        for child in &children {
            let outcome = self.copy_into(child, &dir);
            if outcome != TreeOutcome::Complete {
                return (outcome, Some(dir));
            }
        }
        (TreeOutcome::Complete, Some(dir))
    }

    fn copy_file<S: TreeSource, D: TreeSink>(&mut self, source: &S, parent: &D) -> TreeOutcome {
        if self.token.is_cancelled() {
            return TreeOutcome::Cancelled;
        }
        let failed = |stage: &str, e: &dyn std::fmt::Display| {
            warn!(source = %source.id(), stage, error = %e, "File copy failed");
            TreeOutcome::Failed(source.id())
        };
        let mut reader = match source.open() {
            Ok(reader) => reader,
            Err(e) => return failed("open", &e),
        };
        let mut writer = match parent.create_file(&source.name()) {
            Ok(writer) => writer,
            Err(e) => return failed("create", &e),
        };
        let token = self.token;
        let copied = copy_chunks(&mut reader, &mut writer, &mut self.buf, || token.is_cancelled());
        let settled = parent.finish_file(writer);
        match (copied, settled) {
            (Ok(Copied::Complete(bytes)), Ok(())) => {
                debug!(source = %source.id(), bytes, "File copied");
                (self.on_item)();
                TreeOutcome::Complete
            }
            (Ok(Copied::Cancelled(_)), _) => TreeOutcome::Cancelled,
            (Err(e), _) => failed("transfer", &e),
            (Ok(Copied::Complete(_)), Err(e)) => failed("finish", &e),
        }
    }
}

/// Visit `root` and every descendant, parents before children.
///
/// `visit` receives each node with its path relative to the parent of
/// `root` (so the root's own relative path is its name).
pub fn walk_tree<S: TreeSource>(
    root: &S,
    visit: &mut dyn FnMut(&S, &str),
) -> Result<(), EngineError> {
    walk_node(root, &root.name(), visit)
}

fn walk_node<S: TreeSource>(
    node: &S,
    rel: &str,
    visit: &mut dyn FnMut(&S, &str),
) -> Result<(), EngineError> {
    visit(node, rel);
    if node.is_directory() {
        let children = node.children().map_err(|source| EngineError::Walk {
            id: node.id(),
            source,
        })?;
        for child in &children {
            let child_rel = path::path_join(&[rel, child.name().as_str()]);
            walk_node(child, &child_rel, visit)?;
        }
    }
    Ok(())
}

/// Take ownership of every node of the tree, parents before children, each
/// paired with its path relative to the parent of `root`.
pub fn flatten_tree<S: TreeSource>(root: S) -> Result<Vec<(String, S)>, EngineError> {
    let mut out = Vec::new();
    let rel = root.name();
    flatten_into(root, rel, &mut out)?;
    Ok(out)
}

fn flatten_into<S: TreeSource>(
    node: S,
    rel: String,
    out: &mut Vec<(String, S)>,
) -> Result<(), EngineError> {
    let children = if node.is_directory() {
        node.children().map_err(|source| EngineError::Walk {
            id: node.id(),
            source,
        })?
    } else {
        Vec::new()
    };
    let child_rels: Vec<String> = children
        .iter()
        .map(|child| path::path_join(&[rel.as_str(), child.name().as_str()]))
        .collect();
    out.push((rel, node));
    for (child, child_rel) in children.into_iter().zip(child_rels) {
        flatten_into(child, child_rel, out)?;
    }
    Ok(())
}

/// Number of nodes in the tree, `root` included.
pub fn count_tree<S: TreeSource>(root: &S) -> Result<usize, EngineError> {
    let mut count = 0;
    walk_tree(root, &mut |_, _| count += 1)?;
    Ok(count)
}

/// A file or directory on the host filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostNode {
    path: PathBuf,
}

impl HostNode {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Boxed as an [`ExternalTree`].
    pub fn tree(path: impl Into<PathBuf>) -> Box<dyn ExternalTree> {
        Box::new(Self::new(path))
    }

    /// Boxed as a [`Wipeable`].
    pub fn wipeable(path: impl Into<PathBuf>) -> Box<dyn Wipeable> {
        Box::new(Self::new(path))
    }
}

/// Host file writer whose `flush` reaches the disk.
struct SyncingFile(File);

impl Write for SyncingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()?;
        self.0.sync_data()
    }
}

impl ExternalTree for HostNode {
    fn id(&self) -> String {
        self.path.display().to_string()
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn is_directory(&self) -> bool {
        self.path.is_dir()
    }

    /// Symlinks to directories are skipped so a link back up the tree
    /// cannot recurse forever. Symlinks to files are read through.
    fn list_children(&self) -> io::Result<Vec<Box<dyn ExternalTree>>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_symlink() && path.is_dir() {
                debug!(path = %path.display(), "Skipping symlinked directory");
                continue;
            }
            paths.push(path);
        }
        paths.sort();
        Ok(paths.into_iter().map(HostNode::tree).collect())
    }

    fn create_file(&self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(File::create(self.path.join(name))?))
    }

    fn create_directory(&self, name: &str) -> io::Result<Box<dyn ExternalTree>> {
        let dir = self.path.join(name);
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {}
            Err(e) => return Err(e),
        }
        Ok(HostNode::tree(dir))
    }

    fn open_for_read(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

impl Wipeable for HostNode {
    fn id(&self) -> String {
        self.path.display().to_string()
    }

    fn size(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    fn open_for_overwrite(&self) -> io::Result<Box<dyn Write + Send>> {
        let file = OpenOptions::new()
            .write(true)
            .truncate(false)
            .open(&self.path)?;
        Ok(Box::new(SyncingFile(file)))
    }

    fn delete(&self) -> io::Result<()> {
        if fs::symlink_metadata(&self.path)?.is_dir() {
            fs::remove_dir_all(&self.path)
        } else {
            fs::remove_file(&self.path)
        }
    }

    fn truncate(&self) -> io::Result<()> {
        OpenOptions::new()
            .write(true)
            .open(&self.path)?
            .set_len(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxvault_core::MemoryVolume;
    use oxvault_core::testing::assert_volume_file;
    use tempfile::TempDir;

    fn host_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("photos");
        fs::create_dir_all(root.join("2024/summer")).unwrap();
        fs::write(root.join("a.jpg"), b"aaaa").unwrap();
        fs::write(root.join("2024/b.jpg"), b"bb").unwrap();
        fs::write(root.join("2024/summer/c.jpg"), b"c").unwrap();
        dir
    }

    #[test]
    fn test_walk_tree_parents_first() {
        let dir = host_tree();
        let root = HostNode::tree(dir.path().join("photos"));
        let mut seen = Vec::new();
        walk_tree(&root, &mut |_, rel| seen.push(rel.to_string())).unwrap();
        assert_eq!(
            seen,
            [
                "photos",
                "photos/2024",
                "photos/2024/b.jpg",
                "photos/2024/summer",
                "photos/2024/summer/c.jpg",
                "photos/a.jpg",
            ]
        );
        assert_eq!(count_tree(&root).unwrap(), 6);

        let owned: Vec<String> = flatten_tree(root)
            .unwrap()
            .into_iter()
            .map(|(rel, _)| rel)
            .collect();
        assert_eq!(owned, seen);
    }

    #[test]
    fn test_copy_host_tree_into_volume() {
        let dir = host_tree();
        let volume = MemoryVolume::new();
        let token = CancelToken::new();
        let mut items = 0;
        let mut on_item = || items += 1;
        let mut copier = TreeCopier::new(3, &token, &mut on_item);

        let source = HostNode::tree(dir.path().join("photos"));
        let dest = VolumeNode::open(&volume, "/").unwrap();
        assert_eq!(copier.copy_into(&source, &dest), TreeOutcome::Complete);
        drop(copier);
        assert_eq!(items, 6);
        assert_volume_file(&volume, "/photos/a.jpg", b"aaaa");
        assert_volume_file(&volume, "/photos/2024/summer/c.jpg", b"c");
    }

    #[test]
    fn test_copy_volume_tree_to_host() {
        let volume = MemoryVolume::new();
        volume.put_file("/docs/x/y.txt", b"yyy");
        let out = TempDir::new().unwrap();
        let token = CancelToken::new();
        let mut on_item = || {};
        let mut copier = TreeCopier::new(2, &token, &mut on_item);

        let source = VolumeNode::open(&volume, "/docs").unwrap();
        let (outcome, created) = copier.copy_dir(&source, &HostNode::tree(out.path()));
        assert_eq!(outcome, TreeOutcome::Complete);
        assert_eq!(created.unwrap().id(), out.path().join("docs").display().to_string());
        assert_eq!(fs::read(out.path().join("docs/x/y.txt")).unwrap(), b"yyy");
    }

    #[test]
    fn test_copy_stops_when_cancelled() {
        let volume = MemoryVolume::new();
        volume.put_file("/a", b"1");
        let token = CancelToken::new();
        token.cancel();
        let mut on_item = || {};
        let mut copier = TreeCopier::new(16, &token, &mut on_item);
        let source = VolumeNode::open(&volume, "/a").unwrap();
        let out = TempDir::new().unwrap();
        assert_eq!(
            copier.copy_into(&source, &HostNode::tree(out.path())),
            TreeOutcome::Cancelled
        );
        assert!(!out.path().join("a").exists());
    }

    #[test]
    fn test_missing_source_fails_with_its_id() {
        let out = TempDir::new().unwrap();
        let missing = HostNode::tree(out.path().join("ghost"));
        let volume = MemoryVolume::new();
        let token = CancelToken::new();
        let mut on_item = || {};
        let mut copier = TreeCopier::new(16, &token, &mut on_item);
        let dest = VolumeNode::open(&volume, "/").unwrap();
        assert_eq!(
            copier.copy_into(&missing, &dest),
            TreeOutcome::Failed(missing.id())
        );
        assert!(volume.get_attr("/ghost").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directories_are_not_followed() {
        let dir = TempDir::new().unwrap();
        let album = dir.path().join("album");
        fs::create_dir(&album).unwrap();
        fs::write(album.join("a.txt"), b"a").unwrap();
        let outside = dir.path().join("outside.txt");
        fs::write(&outside, b"out").unwrap();
        std::os::unix::fs::symlink(&album, album.join("loop")).unwrap();
        std::os::unix::fs::symlink(&outside, album.join("link.txt")).unwrap();

        let root = HostNode::tree(&album);
        assert_eq!(count_tree(&root).unwrap(), 3);

        let volume = MemoryVolume::new();
        let token = CancelToken::new();
        let mut on_item = || {};
        let mut copier = TreeCopier::new(16, &token, &mut on_item);
        let dest = VolumeNode::open(&volume, "/").unwrap();
        assert_eq!(copier.copy_into(&root, &dest), TreeOutcome::Complete);
        assert_volume_file(&volume, "/album/a.txt", b"a");
        assert_volume_file(&volume, "/album/link.txt", b"out");
        assert!(volume.get_attr("/album/loop").is_none());
    }

    #[test]
    fn test_host_wipeable_primitives() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("secret");
        fs::write(&file, b"secret!").unwrap();
        let node = HostNode::new(&file);
        assert_eq!(Wipeable::size(&node).unwrap(), 7);
        {
            let mut w = node.open_for_overwrite().unwrap();
            w.write_all(&[0; 3]).unwrap();
            w.flush().unwrap();
        }
        assert_eq!(fs::read(&file).unwrap(), b"\0\0\0ret!");
        Wipeable::truncate(&node).unwrap();
        assert_eq!(fs::metadata(&file).unwrap().len(), 0);
        node.delete().unwrap();
        assert!(!file.exists());
    }
}
