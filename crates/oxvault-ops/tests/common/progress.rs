//! Progress sink that records every call and can cancel its task.

use std::collections::HashMap;
use std::sync::Arc;

use oxvault_ops::{OperationKind, ProgressHandle, ProgressSink, TaskId, TaskRegistry};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin(OperationKind, Option<usize>),
    Update(usize, Option<usize>),
    End,
}

#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<Event>>,
    tasks: Mutex<HashMap<u64, TaskId>>,
    /// Cancel the task once this many items are done.
    cancel_at: Option<(usize, Arc<TaskRegistry>)>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_at(done: usize, registry: Arc<TaskRegistry>) -> Self {
        Self {
            cancel_at: Some((done, registry)),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    /// Highest `done` value reported.
    pub fn last_done(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Update(done, _) => Some(*done),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }
}

impl ProgressSink for RecordingProgress {
    fn begin(&self, task: TaskId, kind: OperationKind, total: Option<usize>) -> ProgressHandle {
        self.events.lock().push(Event::Begin(kind, total));
        self.tasks.lock().insert(task.as_u64(), task);
        ProgressHandle(task.as_u64())
    }

    fn update(&self, handle: ProgressHandle, done: usize, total: Option<usize>) {
        self.events.lock().push(Event::Update(done, total));
        if let Some((at, registry)) = &self.cancel_at
            && done == *at
            && let Some(task) = self.tasks.lock().get(&handle.0)
        {
            registry.cancel(*task);
        }
    }

    fn end(&self, _handle: ProgressHandle) {
        self.events.lock().push(Event::End);
    }
}
