//! Cancellable bulk file operations over encrypted volumes.
//!
//! This crate sits on top of the [`EncryptedVolume`](oxvault_core::EncryptedVolume)
//! capability and provides:
//!
//! - [`VolumeManager`]: the registry of open volumes, each with its own
//!   [`SerialExecutor`] so a volume is never called concurrently
//! - [`FileOperationEngine`]: copy, move, import, export, delete, wipe and
//!   whole-tree clone as tasks with progress and cooperative cancellation
//! - [`TaskResult`]: the closed outcome every task ends with
//! - Selection planning ([`plan_copy`], [`plan_move`]) that flattens trees
//!   parent-first before they reach the engine
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use oxvault_core::HostVolume;
//! use oxvault_ops::{
//!     EngineConfig, FileOperationEngine, TracingProgress, VolumeData, VolumeKind, VolumeManager,
//!     plan_copy,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = Arc::new(VolumeManager::new());
//! let volume = Arc::new(HostVolume::open("/tmp/vault")?);
//! let id = manager.insert(volume.clone(), VolumeData::new("vault", "/tmp/vault", VolumeKind::Plain))?;
//!
//! let engine = FileOperationEngine::new(
//!     Arc::clone(&manager),
//!     Arc::new(TracingProgress::new()),
//!     EngineConfig::default(),
//! );
//! let items = plan_copy(volume.as_ref(), &["/docs"], "/", "/backup")?;
//! let task = engine.copy_elements(id, items, None);
//! println!("{}", task.join().await);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod manager;
pub mod operation_file;
pub mod planner;
pub mod progress;
pub mod result;
pub mod tree;
pub mod wipe;

pub use cancel::{CancelToken, TaskId, TaskInfo, TaskRegistry};
pub use config::{ConfigError, EngineConfig};
pub use engine::{CloneOutcome, FileOperationEngine, ImportOutcome, TaskHandle, TaskOutput};
pub use error::{EngineError, PlanError};
pub use executor::{ExecutorStats, JobResult, SerialExecutor, SubmitError};
pub use manager::{VolumeData, VolumeId, VolumeKind, VolumeManager};
pub use operation_file::OperationFile;
pub use planner::{MovePlan, conflicts, plan_copy, plan_import, plan_move};
pub use progress::{NoProgress, OperationKind, ProgressHandle, ProgressSink, TracingProgress};
pub use result::{TaskResult, TaskState};
pub use tree::{
    ExternalTree, HostNode, TreeCopier, TreeOutcome, TreeSink, TreeSource, VolumeNode, Wipeable,
    count_tree, flatten_tree, walk_tree,
};
pub use wipe::{WIPE_PASSES, Wiped, Wiper};
