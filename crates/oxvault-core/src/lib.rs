//! Encrypted volume capability for oxvault.
//!
//! An opened container is exposed through [`EncryptedVolume`], a handle-based
//! set of file primitives. Everything above the primitives (streaming export
//! and import, whole-file loads, recursive listing and removal) lives in
//! [`VolumeExt`] so that every backend gets the same derived behaviour.
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryVolume`] keeps the whole tree in memory (tests, scratch volumes)
//! - [`HostVolume`] maps a plaintext host directory (development, the CLI)
//!
//! Cryptographic backends implement the same trait out of tree.

#![deny(unsafe_code)]

pub mod path;
pub mod volume;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use volume::{
    ChunkCopyError, Copied, DEFAULT_IO_CHUNK_SIZE, DirEntry, EncryptedVolume, FileHandle,
    FileType, HandleGuard, HandleTable, HostVolume, LoadError, MAX_KERNEL_WRITE, MemoryVolume,
    Removal, Stat, TransferError, VolumeError, VolumeExt, VolumeReader, VolumeWriter, copy_chunks,
};
