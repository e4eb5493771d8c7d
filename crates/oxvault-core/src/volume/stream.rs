//! Streaming adapters over volume handles.
//!
//! [`VolumeReader`] and [`VolumeWriter`] expose an open volume file as
//! `std::io::Read` / `std::io::Write`, so volume content can be piped to and
//! from anything in the io ecosystem with [`copy_chunks`]. Both adapters own
//! their handle and release it on drop.
//!
//! A [`VolumeWriter`] treats a short write as a hard failure: the engine
//! below may have stored a partial chunk, and retrying the remainder would
//! paper over a full disk or a broken container. The confirmed offset is not
//! advanced for the failed chunk, and the file is truncated to that offset
//! when the writer is finished or dropped.

use std::io::{self, Read, Write};

use thiserror::Error;
use tracing::{trace, warn};

use super::{EncryptedVolume, FileHandle, VolumeError};

/// Closes a volume handle when dropped.
pub struct HandleGuard<'a, V: EncryptedVolume + ?Sized> {
    volume: &'a V,
    handle: FileHandle,
    open: bool,
}

impl<'a, V: EncryptedVolume + ?Sized> HandleGuard<'a, V> {
    pub fn new(volume: &'a V, handle: FileHandle) -> Self {
        Self {
            volume,
            handle,
            open: true,
        }
    }

    pub fn handle(&self) -> FileHandle {
        self.handle
    }

    pub fn volume(&self) -> &'a V {
        self.volume
    }

    /// Close now and report the result instead of logging it.
    pub fn close(mut self) -> Result<(), VolumeError> {
        self.open = false;
        self.volume.close_file(self.handle)
    }
}

impl<V: EncryptedVolume + ?Sized> Drop for HandleGuard<'_, V> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.volume.close_file(self.handle) {
                warn!(handle = %self.handle, error = %e, "Failed to close file handle");
            }
        }
    }
}

/// Sequential reader over a volume file.
pub struct VolumeReader<'a, V: EncryptedVolume + ?Sized> {
    guard: HandleGuard<'a, V>,
    offset: u64,
}

impl<'a, V: EncryptedVolume + ?Sized> VolumeReader<'a, V> {
    pub fn open(volume: &'a V, path: &str) -> Result<Self, VolumeError> {
        let handle = volume.open_file_read_mode(path)?;
        trace!(path, %handle, "Opened volume file for reading");
        Ok(Self {
            guard: HandleGuard::new(volume, handle),
            offset: 0,
        })
    }

    /// Bytes read so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn close(self) -> Result<(), VolumeError> {
        self.guard.close()
    }
}

impl<V: EncryptedVolume + ?Sized> Read for VolumeReader<'_, V> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self
            .guard
            .volume()
            .read(self.guard.handle(), self.offset, buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

/// Sequential writer into a volume file.
///
/// The file is opened without truncation; on [`finish`](Self::finish) (or
/// drop) it is truncated to the number of bytes this writer confirmed, so
/// overwriting a longer file never leaves stale trailing bytes.
pub struct VolumeWriter<'a, V: EncryptedVolume + ?Sized> {
    volume: &'a V,
    handle: FileHandle,
    path: String,
    offset: u64,
    settled: bool,
}

impl<'a, V: EncryptedVolume + ?Sized> VolumeWriter<'a, V> {
    pub fn create(volume: &'a V, path: &str) -> Result<Self, VolumeError> {
        let handle = volume.open_file_write_mode(path)?;
        trace!(path, %handle, "Opened volume file for writing");
        Ok(Self {
            volume,
            handle,
            path: path.to_string(),
            offset: 0,
            settled: false,
        })
    }

    /// Bytes confirmed written so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Truncate to the confirmed length and close the handle.
    ///
    /// Returns the final file length.
    pub fn finish(mut self) -> Result<u64, VolumeError> {
        self.settle()
    }

    fn settle(&mut self) -> Result<u64, VolumeError> {
        self.settled = true;
        // Truncate while the handle is still open; some engines require it.
        let truncated = self.volume.truncate(&self.path, self.offset);
        let closed = self.volume.close_file(self.handle);
        truncated?;
        closed?;
        Ok(self.offset)
    }
}

impl<V: EncryptedVolume + ?Sized> Write for VolumeWriter<'_, V> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let written = self.volume.write(self.handle, self.offset, buf)?;
        if written != buf.len() {
            return Err(VolumeError::ShortWrite {
                path: self.path.clone(),
                offset: self.offset,
                written,
                expected: buf.len(),
            }
            .into());
        }
        self.offset += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<V: EncryptedVolume + ?Sized> Drop for VolumeWriter<'_, V> {
    fn drop(&mut self) {
        if !self.settled {
            if let Err(e) = self.settle() {
                warn!(path = %self.path, error = %e, "Failed to settle volume writer");
            }
        }
    }
}

/// How a chunked copy ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Copied {
    /// Source reached end of file; all bytes were written.
    Complete(u64),
    /// Stopped between chunks on request.
    Cancelled(u64),
}

impl Copied {
    pub fn bytes(self) -> u64 {
        match self {
            Copied::Complete(n) | Copied::Cancelled(n) => n,
        }
    }
}

/// Which side of a chunked copy failed.
#[derive(Error, Debug)]
pub enum ChunkCopyError {
    #[error("reading source failed after {copied} bytes: {source}")]
    Read {
        copied: u64,
        #[source]
        source: io::Error,
    },

    #[error("writing destination failed after {copied} bytes: {source}")]
    Write {
        copied: u64,
        #[source]
        source: io::Error,
    },
}

impl ChunkCopyError {
    pub fn io_error(&self) -> &io::Error {
        match self {
            ChunkCopyError::Read { source, .. } | ChunkCopyError::Write { source, .. } => source,
        }
    }

    /// The volume error behind this failure, if a volume adapter raised it.
    pub fn volume_error(&self) -> Option<&VolumeError> {
        self.io_error()
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<VolumeError>())
    }
}

/// Copy `reader` into `writer` one buffer at a time.
///
/// `should_stop` is checked before every chunk; when it returns `true` the
/// copy ends with [`Copied::Cancelled`] and nothing further is read.
pub fn copy_chunks<R, W>(
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
    should_stop: impl Fn() -> bool,
) -> Result<Copied, ChunkCopyError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut copied = 0_u64;
    loop {
        if should_stop() {
            return Ok(Copied::Cancelled(copied));
        }
        let n = match reader.read(buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(ChunkCopyError::Read { copied, source }),
        };
        writer
            .write_all(&buf[..n])
            .map_err(|source| ChunkCopyError::Write { copied, source })?;
        copied += n as u64;
    }
    writer
        .flush()
        .map_err(|source| ChunkCopyError::Write { copied, source })?;
    Ok(Copied::Complete(copied))
}

/// Failure of a derived streaming operation.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Copy(#[from] ChunkCopyError),
}
