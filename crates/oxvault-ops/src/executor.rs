//! Single-worker serial executor.
//!
//! Every volume gets one of these. Jobs are closures run on a dedicated
//! thread strictly one after another, in submission order, so the volume
//! underneath never sees two callers at once.
//!
//! # Design
//!
//! - One named worker thread per executor
//! - Unbounded submission queue (bulk tasks wait their turn, never rejected)
//! - Results returned via oneshot channels
//! - A panicking job is caught and reported through its channel; the worker
//!   keeps serving the queue
//!
//! Shutdown drops the sender. The worker drains whatever is already queued
//! and exits, and [`SerialExecutor::shutdown`] joins it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// What a job produced: its value, or the panic payload.
pub type JobResult<R> = thread::Result<R>;

/// Job counters of one executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub submitted: u64,
    pub completed: u64,
    /// Jobs that panicked.
    pub panicked: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
}

impl Counters {
    fn record_complete(&self, success: bool) {
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.panicked.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> ExecutorStats {
        ExecutorStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("executor has been shut down")]
    Shutdown,
}

/// Runs jobs one at a time on a dedicated thread.
pub struct SerialExecutor {
    name: String,
    submit_tx: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for SerialExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialExecutor")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SerialExecutor {
    /// Start the worker thread.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (submit_tx, submit_rx) = unbounded::<Job>();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(&submit_rx))?;
        debug!(executor = %name, "Serial executor started");
        Ok(Self {
            name,
            submit_tx: Mutex::new(Some(submit_tx)),
            worker: Mutex::new(Some(worker)),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Queue `f` behind every job already submitted.
    pub fn submit<R, F>(&self, f: F) -> Result<oneshot::Receiver<JobResult<R>>, SubmitError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let counters = Arc::clone(&self.counters);
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f));
            counters.record_complete(result.is_ok());
            if result.is_err() {
                warn!("Job panicked on serial executor");
            }
            let _ = result_tx.send(result);
        });

        let guard = self.submit_tx.lock();
        let tx = guard.as_ref().ok_or(SubmitError::Shutdown)?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        tx.send(job).map_err(|_| SubmitError::Shutdown)?;
        trace!(executor = %self.name, "Job submitted");
        Ok(result_rx)
    }

    pub fn stats(&self) -> ExecutorStats {
        self.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.submit_tx.lock().is_some()
    }

    /// Stop accepting jobs, let queued ones finish, and join the worker.
    ///
    /// Idempotent. Must not be called from a job on this executor.
    pub fn shutdown(&self) {
        drop(self.submit_tx.lock().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                warn!(executor = %self.name, "Shutdown requested from own worker, not joining");
                return;
            }
            if worker.join().is_err() {
                warn!(executor = %self.name, "Executor worker exited abnormally");
            }
            debug!(executor = %self.name, "Serial executor stopped");
        }
    }
}

impl Drop for SerialExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx: &Receiver<Job>) {
    // Ends once every sender is gone and the queue is drained.
    for job in rx {
        job();
    }
}
