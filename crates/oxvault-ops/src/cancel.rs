//! Task ids and cooperative cancellation.
//!
//! Every submitted task gets a [`TaskId`] and a [`CancelToken`]. The engine
//! checks the token before each item and between I/O chunks; cancelling only
//! flips the flag, the task itself decides where it stops.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

use crate::manager::VolumeId;
use crate::progress::OperationKind;

/// Opaque id assigned at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A task that has been submitted and has not finished yet.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: TaskId,
    pub kind: OperationKind,
    /// Volume the task runs on, if any.
    pub volume: Option<VolumeId>,
}

#[derive(Debug)]
struct Entry {
    info: TaskInfo,
    token: CancelToken,
}

/// Registry of in-flight tasks, addressable by id or by volume.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: DashMap<TaskId, Entry>,
    next_id: AtomicU64,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Assign an id and a fresh token to a new task.
    pub fn register(&self, kind: OperationKind, volume: Option<VolumeId>) -> (TaskId, CancelToken) {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = CancelToken::new();
        self.tasks.insert(
            id,
            Entry {
                info: TaskInfo { id, kind, volume },
                token: token.clone(),
            },
        );
        (id, token)
    }

    /// Request cancellation. Returns `false` if the task is unknown or done.
    pub fn cancel(&self, id: TaskId) -> bool {
        match self.tasks.get(&id) {
            Some(entry) => {
                entry.token.cancel();
                debug!(task = %id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancel every task bound to `volume`. Returns how many were signalled.
    pub fn cancel_volume(&self, volume: VolumeId) -> usize {
        let mut count = 0;
        for entry in &self.tasks {
            if entry.info.volume == Some(volume) {
                entry.token.cancel();
                count += 1;
            }
        }
        if count > 0 {
            debug!(%volume, count, "Cancelled tasks of closing volume");
        }
        count
    }

    pub fn finish(&self, id: TaskId) {
        self.tasks.remove(&id);
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Snapshot of in-flight tasks, ordered by id.
    pub fn running(&self) -> Vec<TaskInfo> {
        let mut tasks: Vec<TaskInfo> = self.tasks.iter().map(|e| e.info.clone()).collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Removes a task from its registry when dropped, whatever way the task ends.
pub(crate) struct Registration {
    registry: Arc<TaskRegistry>,
    id: TaskId,
}

impl Registration {
    pub(crate) fn new(registry: Arc<TaskRegistry>, id: TaskId) -> Self {
        Self { registry, id }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.finish(self.id);
    }
}
