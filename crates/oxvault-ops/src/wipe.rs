//! Zero-fill wiping of external files.

use std::io::{self, Write};

use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::tree::Wipeable;

/// Default number of overwrite passes.
pub const WIPE_PASSES: u32 = 2;

pub const DEFAULT_WIPE_BUFFER_SIZE: usize = 4096;

/// How a single wipe ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wiped {
    Done,
    Cancelled,
}

/// Overwrites sources with zeros, then removes them.
#[derive(Debug)]
pub struct Wiper {
    passes: u32,
    zeros: Vec<u8>,
}

impl Wiper {
    pub fn new(passes: u32, buffer_size: usize) -> Self {
        Self {
            passes,
            zeros: vec![0; buffer_size.max(1)],
        }
    }

    /// Overwrite `source` `passes` times over its full length, then delete it.
    ///
    /// Each pass gets a fresh writer so the next one starts at offset 0 after
    /// a flush. A source that cannot be deleted is truncated to zero length
    /// instead. Cancellation is honoured between passes and between buffers;
    /// a cancelled source keeps whatever was already overwritten.
    pub fn wipe(&self, source: &dyn Wipeable, token: &CancelToken) -> io::Result<Wiped> {
        let size = source.size()?;
        for pass in 0..self.passes {
            if token.is_cancelled() {
                return Ok(Wiped::Cancelled);
            }
            let mut out = source.open_for_overwrite()?;
            let mut remaining = size;
            while remaining > 0 {
                if token.is_cancelled() {
                    return Ok(Wiped::Cancelled);
                }
                let n = usize::try_from(remaining).map_or(self.zeros.len(), |r| r.min(self.zeros.len()));
                out.write_all(&self.zeros[..n])?;
                remaining -= n as u64;
            }
            out.flush()?;
            trace!(source = %source.id(), pass, "Wipe pass done");
        }

        match source.delete() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Unsupported => {
                debug!(source = %source.id(), "Delete unsupported, truncating");
                source.truncate()?;
            }
            Err(e) => return Err(e),
        }
        Ok(Wiped::Done)
    }
}

impl Default for Wiper {
    fn default() -> Self {
        Self::new(WIPE_PASSES, DEFAULT_WIPE_BUFFER_SIZE)
    }
}
