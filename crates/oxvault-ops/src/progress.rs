//! Progress reporting.
//!
//! The engine calls [`ProgressSink::begin`] when a task starts running,
//! [`ProgressSink::update`] after every completed item and
//! [`ProgressSink::end`] on every exit path. Sinks are called from worker
//! threads and must not block.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::cancel::TaskId;

/// Kind of bulk operation, for progress display and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Copy,
    Move,
    Import,
    Export,
    Delete,
    Wipe,
    CopyVolume,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Copy => "copy",
            OperationKind::Move => "move",
            OperationKind::Import => "import",
            OperationKind::Export => "export",
            OperationKind::Delete => "delete",
            OperationKind::Wipe => "wipe",
            OperationKind::CopyVolume => "copy volume",
        })
    }
}

/// Handle returned by [`ProgressSink::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressHandle(pub u64);

/// Receives progress of running tasks.
pub trait ProgressSink: Send + Sync {
    /// A task started. `total` is `None` while the item count is unknown.
    fn begin(&self, task: TaskId, kind: OperationKind, total: Option<usize>) -> ProgressHandle;

    fn update(&self, handle: ProgressHandle, done: usize, total: Option<usize>);

    fn end(&self, handle: ProgressHandle);
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn begin(&self, _task: TaskId, _kind: OperationKind, _total: Option<usize>) -> ProgressHandle {
        ProgressHandle(0)
    }

    fn update(&self, _handle: ProgressHandle, _done: usize, _total: Option<usize>) {}

    fn end(&self, _handle: ProgressHandle) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Default)]
pub struct TracingProgress {
    next: AtomicU64,
}

impl TracingProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for TracingProgress {
    fn begin(&self, task: TaskId, kind: OperationKind, total: Option<usize>) -> ProgressHandle {
        let handle = ProgressHandle(self.next.fetch_add(1, Ordering::Relaxed) + 1);
        info!(%task, %kind, ?total, progress = handle.0, "Task started");
        handle
    }

    fn update(&self, handle: ProgressHandle, done: usize, total: Option<usize>) {
        match total {
            Some(total) if total > 0 => {
                let percent = done as f64 * 100.0 / total as f64;
                debug!(progress = handle.0, done, total, "{percent:.0}%");
            }
            _ => debug!(progress = handle.0, done, "Item done"),
        }
    }

    fn end(&self, handle: ProgressHandle) {
        debug!(progress = handle.0, "Progress ended");
    }
}

/// Ends a progress handle when dropped.
pub(crate) struct ProgressScope<'a> {
    sink: &'a dyn ProgressSink,
    handle: ProgressHandle,
    total: Option<usize>,
    done: usize,
}

impl<'a> ProgressScope<'a> {
    pub(crate) fn begin(
        sink: &'a dyn ProgressSink,
        task: TaskId,
        kind: OperationKind,
        total: Option<usize>,
    ) -> Self {
        let handle = sink.begin(task, kind, total);
        Self {
            sink,
            handle,
            total,
            done: 0,
        }
    }

    pub(crate) fn set_total(&mut self, total: usize) {
        self.total = Some(total);
        self.sink.update(self.handle, self.done, self.total);
    }

    /// One more item finished.
    pub(crate) fn advance(&mut self) {
        self.done += 1;
        self.sink.update(self.handle, self.done, self.total);
    }
}

impl Drop for ProgressScope<'_> {
    fn drop(&mut self) {
        self.sink.end(self.handle);
    }
}
