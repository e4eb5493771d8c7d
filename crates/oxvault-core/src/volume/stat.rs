/// Kind of a volume entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Directory,
    RegularFile,
    Symlink,
    /// Synthetic "parent folder" entry shown above a directory listing.
    ParentMarker,
}

/// Attributes of a volume entry.
///
/// `size` and `mtime` are `-1` for [`FileType::ParentMarker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub file_type: FileType,
    pub size: i64,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: i64,
}

const S_IFMT: u32 = 0xF000;
const S_IFDIR: u32 = 0x4000;
const S_IFREG: u32 = 0x8000;
const S_IFLNK: u32 = 0xA000;

impl Stat {
    pub fn new(file_type: FileType, size: i64, mtime: i64) -> Self {
        Self {
            file_type,
            size,
            mtime,
        }
    }

    /// Build a stat from a POSIX `st_mode`, as reported by native backends.
    ///
    /// Returns `None` for file types a volume cannot hold (devices, fifos).
    pub fn from_mode(mode: u32, size: i64, mtime: i64) -> Option<Self> {
        let file_type = match mode & S_IFMT {
            S_IFDIR => FileType::Directory,
            S_IFREG => FileType::RegularFile,
            S_IFLNK => FileType::Symlink,
            _ => return None,
        };
        Some(Self::new(file_type, size, mtime))
    }

    pub fn parent_folder() -> Self {
        Self::new(FileType::ParentMarker, -1, -1)
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_regular_file(&self) -> bool {
        self.file_type == FileType::RegularFile
    }

    /// Size as an unsigned byte count; negative sizes read as zero.
    pub fn len(&self) -> u64 {
        u64::try_from(self.size).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
