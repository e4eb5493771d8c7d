//! The bulk file-operation engine.
//!
//! Every operation is submitted as a task and returns a [`TaskHandle`]
//! immediately. Volume-bound tasks run on the target volume's
//! [`SerialExecutor`](crate::SerialExecutor), so they queue behind each other
//! and never touch a volume concurrently. Wiping and whole-tree clones do not
//! involve a volume and run on tokio's blocking pool.
//!
//! # Outcomes
//!
//! - A per-item failure ends the task as [`TaskResult::Failed`] with the
//!   offending path or source id
//! - An [`EngineError`] escaping the item loop, or a panic, ends it as
//!   [`TaskResult::Error`]
//! - Cancellation is checked before every item and between I/O chunks and
//!   ends it as [`TaskResult::Cancelled`] (except for removal, where it
//!   counts as success)
//!
//! # Cross-volume copies
//!
//! [`FileOperationEngine::copy_elements`] with a distinct source volume reads
//! the source directly, outside the source's own worker. That is only safe
//! while no other task mutates the source volume.

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use oxvault_core::path;
use oxvault_core::{
    Copied, EncryptedVolume, Removal, TransferError, VolumeExt, VolumeReader, VolumeWriter,
    copy_chunks,
};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::cancel::{CancelToken, Registration, TaskId, TaskInfo};
use crate::config::EngineConfig;
use crate::error::{EngineError, panic_message};
use crate::executor::JobResult;
use crate::manager::{VolumeId, VolumeManager};
use crate::operation_file::OperationFile;
use crate::progress::{OperationKind, ProgressScope, ProgressSink};
use crate::result::TaskResult;
use crate::tree::{
    ExternalTree, TreeCopier, TreeOutcome, VolumeNode, Wipeable, count_tree, flatten_tree,
};
use crate::wipe::{Wiped, Wiper};

/// Value a task ends with.
pub trait TaskOutput: fmt::Display + Send + 'static {
    /// Outcome for a task that failed outside its item logic.
    fn from_error(message: String) -> Self;
}

impl<T: fmt::Display + Send + 'static> TaskOutput for TaskResult<T> {
    fn from_error(message: String) -> Self {
        TaskResult::Error(message)
    }
}

/// Outcome of [`FileOperationEngine::import_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub result: TaskResult<String>,
    /// Ids of the external files the import read from, so the caller can
    /// offer to wipe them.
    pub sources: Vec<String>,
}

impl fmt::Display for ImportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} sources)", self.result, self.sources.len())
    }
}

impl TaskOutput for ImportOutcome {
    fn from_error(message: String) -> Self {
        Self {
            result: TaskResult::Error(message),
            sources: Vec::new(),
        }
    }
}

/// Outcome of [`FileOperationEngine::copy_volume`].
pub struct CloneOutcome {
    pub result: TaskResult<String>,
    /// Root of the new tree. Present whenever it was created, also when a
    /// descendant failed afterwards.
    pub created: Option<Box<dyn ExternalTree>>,
}

impl fmt::Debug for CloneOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloneOutcome")
            .field("result", &self.result)
            .field("created", &self.created.as_ref().map(|tree| tree.id()))
            .finish()
    }
}

impl fmt::Display for CloneOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.created {
            Some(root) => write!(f, "{} (created {})", self.result, root.id()),
            None => self.result.fmt(f),
        }
    }
}

impl TaskOutput for CloneOutcome {
    fn from_error(message: String) -> Self {
        Self {
            result: TaskResult::Error(message),
            created: None,
        }
    }
}

/// Handle to a submitted task.
///
/// Dropping the handle does not cancel the task.
pub struct TaskHandle<R> {
    id: TaskId,
    token: CancelToken,
    rx: oneshot::Receiver<JobResult<R>>,
}

impl<R> fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<R: TaskOutput> TaskHandle<R> {
    /// A handle whose task already ended.
    fn ready(id: TaskId, token: CancelToken, output: R) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(output));
        Self { id, token, rx }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Ask the task to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the task to end.
    pub async fn join(self) -> R {
        match self.rx.await {
            Ok(Ok(output)) => output,
            Ok(Err(payload)) => {
                R::from_error(EngineError::Panicked(panic_message(payload.as_ref())).to_string())
            }
            Err(_) => R::from_error(EngineError::Dropped.to_string()),
        }
    }
}

/// State a running task carries into its job.
struct TaskContext {
    id: TaskId,
    kind: OperationKind,
    token: CancelToken,
    progress: Arc<dyn ProgressSink>,
    config: EngineConfig,
    _registration: Registration,
}

impl TaskContext {
    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn progress(&self, total: Option<usize>) -> ProgressScope<'_> {
        ProgressScope::begin(self.progress.as_ref(), self.id, self.kind, total)
    }

    fn finish<R: TaskOutput>(&self, result: Result<R, EngineError>) -> R {
        let output = result.unwrap_or_else(|e| {
            warn!(task = %self.id, error = %e, "Task aborted");
            R::from_error(e.to_string())
        });
        info!(task = %self.id, kind = %self.kind, outcome = %output, "Task finished");
        output
    }
}

/// Runs bulk operations against the volumes of a [`VolumeManager`].
pub struct FileOperationEngine {
    manager: Arc<VolumeManager>,
    progress: Arc<dyn ProgressSink>,
    config: EngineConfig,
}

impl fmt::Debug for FileOperationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileOperationEngine")
            .field("manager", &self.manager)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FileOperationEngine {
    pub fn new(
        manager: Arc<VolumeManager>,
        progress: Arc<dyn ProgressSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            manager,
            progress,
            config,
        }
    }

    pub fn manager(&self) -> &Arc<VolumeManager> {
        &self.manager
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Request cancellation of one task. Returns `false` if it already ended.
    pub fn cancel(&self, id: TaskId) -> bool {
        self.manager.tasks().cancel(id)
    }

    pub fn running_tasks(&self) -> Vec<TaskInfo> {
        self.manager.tasks().running()
    }

    fn context(&self, kind: OperationKind, volume: Option<VolumeId>) -> TaskContext {
        let tasks = self.manager.tasks();
        let (id, token) = tasks.register(kind, volume);
        debug!(task = %id, %kind, ?volume, "Task submitted");
        TaskContext {
            id,
            kind,
            token,
            progress: Arc::clone(&self.progress),
            config: self.config.clone(),
            _registration: Registration::new(Arc::clone(tasks), id),
        }
    }

    /// A task that ends with `error` without running.
    fn rejected<R: TaskOutput>(
        &self,
        kind: OperationKind,
        volume: Option<VolumeId>,
        error: &EngineError,
    ) -> TaskHandle<R> {
        let ctx = self.context(kind, volume);
        warn!(task = %ctx.id, %error, "Task rejected");
        let output = R::from_error(error.to_string());
        TaskHandle::ready(ctx.id, ctx.token.clone(), output)
    }

    /// Queue `job` on the worker of `volume`.
    fn submit_on<R, F>(&self, kind: OperationKind, volume: VolumeId, job: F) -> TaskHandle<R>
    where
        R: TaskOutput,
        F: FnOnce(&TaskContext, &dyn EncryptedVolume) -> Result<R, EngineError> + Send + 'static,
    {
        let ctx = self.context(kind, Some(volume));
        let (id, token) = (ctx.id, ctx.token.clone());
        let submitted = self.manager.run_on(volume, move |v| {
            let result = if v.is_closed() {
                Err(EngineError::VolumeClosed(volume))
            } else {
                job(&ctx, v)
            };
            ctx.finish(result)
        });
        match submitted {
            Ok(rx) => TaskHandle { id, token, rx },
            Err(e) => {
                warn!(task = %id, error = %e, "Task rejected");
                TaskHandle::ready(id, token, R::from_error(e.to_string()))
            }
        }
    }

    /// Run `job` on the blocking pool, or a fresh thread outside a runtime.
    fn submit_blocking<R, F>(&self, kind: OperationKind, job: F) -> TaskHandle<R>
    where
        R: TaskOutput,
        F: FnOnce(&TaskContext) -> Result<R, EngineError> + Send + 'static,
    {
        let ctx = self.context(kind, None);
        let (id, token) = (ctx.id, ctx.token.clone());
        let (tx, rx) = oneshot::channel();
        let work = move || {
            let output = panic::catch_unwind(AssertUnwindSafe(move || {
                let result = job(&ctx);
                ctx.finish(result)
            }));
            if output.is_err() {
                warn!(task = %id, "Task panicked");
            }
            let _ = tx.send(output);
        };

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn_blocking(work);
        } else if let Err(e) = thread::Builder::new()
            .name(format!("oxvault-{id}"))
            .spawn(work)
        {
            warn!(task = %id, error = %e, "Failed to start task thread");
        }
        TaskHandle { id, token, rx }
    }

    /// Copy planned items into `target`.
    ///
    /// Directories are created unless they already exist; files are streamed
    /// from `source` (default: `target`) and truncated to the bytes written.
    /// Stops at the first item that fails and reports its source path.
    #[instrument(level = "debug", skip(self, items), fields(items = items.len()))]
    pub fn copy_elements(
        &self,
        target: VolumeId,
        items: Vec<OperationFile>,
        source: Option<VolumeId>,
    ) -> TaskHandle<TaskResult<String>> {
        let source = match source {
            Some(src) if src != target => match self.manager.get_volume(src) {
                Some(volume) => Some(volume),
                None => {
                    return self.rejected(
                        OperationKind::Copy,
                        Some(target),
                        &EngineError::UnknownVolume(src),
                    );
                }
            },
            _ => None,
        };

        self.submit_on(OperationKind::Copy, target, move |ctx, volume| {
            let src_volume: &dyn EncryptedVolume = match &source {
                Some(remote) => remote.as_ref(),
                None => volume,
            };
            let mut progress = ctx.progress(Some(items.len()));
            let mut buf = vec![0_u8; ctx.config.io_chunk_size];

            for item in &items {
                if ctx.is_cancelled() {
                    return Ok(TaskResult::Cancelled);
                }
                let dst = item
                    .dst_path
                    .as_deref()
                    .ok_or_else(|| EngineError::MissingDestination {
                        path: item.src_path.clone(),
                    })?;

                if item.is_directory() {
                    if !volume.path_exists(dst)
                        && let Err(e) = volume.mkdir(dst)
                    {
                        warn!(src = %item.src_path, dst, error = %e, "mkdir failed");
                        return Ok(TaskResult::Failed(item.src_path.clone()));
                    }
                } else {
                    match copy_file(src_volume, &item.src_path, volume, dst, &mut buf, &ctx.token) {
                        Ok(Copied::Complete(bytes)) => {
                            debug!(src = %item.src_path, dst, bytes, "File copied");
                        }
                        Ok(Copied::Cancelled(_)) => return Ok(TaskResult::Cancelled),
                        Err(e) => {
                            warn!(src = %item.src_path, dst, error = %e, "File copy failed");
                            return Ok(TaskResult::Failed(item.src_path.clone()));
                        }
                    }
                }
                progress.advance();
            }
            Ok(TaskResult::Success)
        })
    }

    /// Rename `to_move` items, then remove the emptied merge sources in
    /// `to_clean` deepest first.
    #[instrument(level = "debug", skip(self, to_move, to_clean), fields(to_move = to_move.len(), to_clean = to_clean.len()))]
    pub fn move_elements(
        &self,
        volume: VolumeId,
        to_move: Vec<OperationFile>,
        to_clean: Vec<OperationFile>,
    ) -> TaskHandle<TaskResult<String>> {
        self.submit_on(OperationKind::Move, volume, move |ctx, volume| {
            let mut progress = ctx.progress(Some(to_move.len() + to_clean.len()));

            for item in &to_move {
                if ctx.is_cancelled() {
                    return Ok(TaskResult::Cancelled);
                }
                let dst = item
                    .dst_path
                    .as_deref()
                    .ok_or_else(|| EngineError::MissingDestination {
                        path: item.src_path.clone(),
                    })?;
                if item.is_directory() && volume.get_attr(dst).is_some_and(|s| s.is_directory()) {
                    debug!(src = %item.src_path, dst, "Destination exists, merged by plan");
                } else if let Err(e) = volume.rename(&item.src_path, dst) {
                    warn!(src = %item.src_path, dst, error = %e, "rename failed");
                    return Ok(TaskResult::Failed(item.src_path.clone()));
                }
                progress.advance();
            }

            for dir in to_clean.iter().rev() {
                if ctx.is_cancelled() {
                    return Ok(TaskResult::Cancelled);
                }
                if let Err(e) = volume.rmdir(&dir.src_path) {
                    warn!(dir = %dir.src_path, error = %e, "rmdir of merged source failed");
                    return Ok(TaskResult::Failed(dir.src_path.clone()));
                }
                progress.advance();
            }
            Ok(TaskResult::Success)
        })
    }

    /// Import each external source into the matching destination path.
    ///
    /// A source that does not exist is a per-item failure reported by its id.
    #[instrument(level = "debug", skip(self, dst_paths, sources), fields(items = sources.len()))]
    pub fn import_files_from_uris(
        &self,
        volume: VolumeId,
        dst_paths: Vec<String>,
        sources: Vec<Box<dyn ExternalTree>>,
    ) -> TaskHandle<TaskResult<String>> {
        self.submit_on(OperationKind::Import, volume, move |ctx, volume| {
            if dst_paths.len() != sources.len() {
                return Err(EngineError::LengthMismatch {
                    destinations: dst_paths.len(),
                    sources: sources.len(),
                });
            }
            let mut progress = ctx.progress(Some(sources.len()));
            import_files(ctx, volume, &dst_paths, &sources, &mut progress)
        })
    }

    /// Import the external directory `root_src` as `root_dst/<name>`.
    ///
    /// The whole source tree is listed first; all directories are created
    /// (parents first) before any file is imported.
    #[instrument(level = "debug", skip(self, root_src), fields(src = %root_src.id()))]
    pub fn import_directory(
        &self,
        volume: VolumeId,
        root_dst: String,
        root_src: Box<dyn ExternalTree>,
    ) -> TaskHandle<ImportOutcome> {
        self.submit_on(OperationKind::Import, volume, move |ctx, volume| {
            let mut progress = ctx.progress(None);

            let mut dirs = Vec::new();
            let mut dst_paths = Vec::new();
            let mut sources = Vec::new();
            for (rel, node) in flatten_tree(root_src)? {
                let dst = path::path_join(&[root_dst.as_str(), rel.as_str()]);
                if node.is_directory() {
                    dirs.push((dst, node.id()));
                } else {
                    dst_paths.push(dst);
                    sources.push(node);
                }
            }
            let ids: Vec<String> = sources.iter().map(|s| s.id()).collect();
            debug!(dirs = dirs.len(), files = sources.len(), "Import tree listed");
            let outcome = |result| ImportOutcome {
                result,
                sources: ids.clone(),
            };

            progress.set_total(sources.len());
            for (dst, id) in &dirs {
                if ctx.is_cancelled() {
                    return Ok(outcome(TaskResult::Cancelled));
                }
                if !volume.get_attr(dst).is_some_and(|s| s.is_directory())
                    && let Err(e) = volume.mkdir(dst)
                {
                    warn!(dst, source = %id, error = %e, "mkdir failed");
                    return Ok(outcome(TaskResult::Failed(id.clone())));
                }
            }

            let result = import_files(ctx, volume, &dst_paths, &sources, &mut progress)?;
            Ok(outcome(result))
        })
    }

    /// Export volume paths (files or whole directories) into `destination`.
    ///
    /// Stops at the first failure and reports the volume-side path.
    #[instrument(level = "debug", skip(self, paths, destination), fields(items = paths.len(), dest = %destination.id()))]
    pub fn export_files(
        &self,
        volume: VolumeId,
        paths: Vec<String>,
        destination: Box<dyn ExternalTree>,
    ) -> TaskHandle<TaskResult<String>> {
        self.submit_on(OperationKind::Export, volume, move |ctx, volume| {
            let mut progress = ctx.progress(Some(paths.len()));
            let mut on_node = || {};
            let mut copier = TreeCopier::new(ctx.config.io_chunk_size, &ctx.token, &mut on_node);

            for src in &paths {
                if ctx.is_cancelled() {
                    return Ok(TaskResult::Cancelled);
                }
                let node = match VolumeNode::open(volume, src) {
                    Ok(node) => node,
                    Err(e) => {
                        warn!(src, error = %e, "Export source missing");
                        return Ok(TaskResult::Failed(src.clone()));
                    }
                };
                match copier.copy_into(&node, &destination) {
                    TreeOutcome::Complete => progress.advance(),
                    other => return Ok(tree_result(other)),
                }
            }
            Ok(TaskResult::Success)
        })
    }

    /// Delete items, directories children first.
    ///
    /// A cancelled removal ends as `Success`: what was deleted stays deleted.
    #[instrument(level = "debug", skip(self, items), fields(items = items.len()))]
    pub fn remove_elements(
        &self,
        volume: VolumeId,
        items: Vec<OperationFile>,
    ) -> TaskHandle<TaskResult<String>> {
        self.submit_on(OperationKind::Delete, volume, move |ctx, volume| {
            let mut progress = ctx.progress(Some(items.len()));
            let mut result = TaskResult::Success;
            for item in &items {
                if ctx.is_cancelled() {
                    result = TaskResult::Cancelled;
                    break;
                }
                match volume.remove_tree_until(&item.src_path, &|| ctx.is_cancelled()) {
                    Removal::Removed => progress.advance(),
                    Removal::Stopped => {
                        result = TaskResult::Cancelled;
                        break;
                    }
                    Removal::Failed(path) => {
                        warn!(item = %item.src_path, failed = %path, "Removal failed");
                        result = TaskResult::Failed(path);
                        break;
                    }
                }
            }
            Ok(result.cancelled_as_success())
        })
    }

    /// Overwrite each source with zeros and delete it, then delete `root`.
    ///
    /// A failure ends the task with `"<source id>: <error>"`.
    #[instrument(level = "debug", skip(self, sources, root), fields(items = sources.len()))]
    pub fn wipe_uris(
        &self,
        sources: Vec<Box<dyn Wipeable>>,
        root: Option<Box<dyn Wipeable>>,
    ) -> TaskHandle<TaskResult<String>> {
        self.submit_blocking(OperationKind::Wipe, move |ctx| {
            let wiper = Wiper::new(ctx.config.wipe_passes, ctx.config.wipe_buffer_size);
            let mut progress = ctx.progress(Some(sources.len()));

            for source in &sources {
                if ctx.is_cancelled() {
                    return Ok(TaskResult::Cancelled);
                }
                match wiper.wipe(source.as_ref(), &ctx.token) {
                    Ok(Wiped::Done) => {
                        debug!(source = %source.id(), "Wiped");
                        progress.advance();
                    }
                    Ok(Wiped::Cancelled) => return Ok(TaskResult::Cancelled),
                    Err(e) => return Ok(wipe_failure(source.as_ref(), &e)),
                }
            }
            if let Some(root) = &root
                && let Err(e) = root.delete()
            {
                return Ok(wipe_failure(root.as_ref(), &e));
            }
            Ok(TaskResult::Success)
        })
    }

    /// Duplicate the external tree `source` inside `dest_parent`.
    ///
    /// The tree is counted first so progress has a total.
    #[instrument(level = "debug", skip(self, source, dest_parent), fields(src = %source.id(), dest = %dest_parent.id()))]
    pub fn copy_volume(
        &self,
        source: Box<dyn ExternalTree>,
        dest_parent: Box<dyn ExternalTree>,
    ) -> TaskHandle<CloneOutcome> {
        self.submit_blocking(OperationKind::CopyVolume, move |ctx| {
            let total = count_tree(&source)?;
            let mut progress = ctx.progress(Some(total));
            let mut on_node = || progress.advance();
            let mut copier = TreeCopier::new(ctx.config.io_chunk_size, &ctx.token, &mut on_node);

            let (outcome, created) = if source.is_directory() {
                copier.copy_dir(&source, &dest_parent)
            } else {
                (copier.copy_into(&source, &dest_parent), None)
            };
            Ok(CloneOutcome {
                result: tree_result(outcome),
                created,
            })
        })
    }
}

fn tree_result(outcome: TreeOutcome) -> TaskResult<String> {
    match outcome {
        TreeOutcome::Complete => TaskResult::Success,
        TreeOutcome::Cancelled => TaskResult::Cancelled,
        TreeOutcome::Failed(id) => TaskResult::Failed(id),
    }
}

fn wipe_failure(source: &dyn Wipeable, error: &io::Error) -> TaskResult<String> {
    warn!(source = %source.id(), %error, "Wipe failed");
    TaskResult::Failed(format!("{}: {error}", source.id()))
}

/// Stream one volume file into another (or the same) volume.
///
/// The destination is truncated to the bytes written on every exit path and
/// both handles are closed before returning.
fn copy_file(
    src_volume: &dyn EncryptedVolume,
    src: &str,
    dst_volume: &dyn EncryptedVolume,
    dst: &str,
    buf: &mut [u8],
    token: &CancelToken,
) -> Result<Copied, TransferError> {
    let mut reader = VolumeReader::open(src_volume, src)?;
    let mut writer = VolumeWriter::create(dst_volume, dst)?;
    let copied = copy_chunks(&mut reader, &mut writer, buf, || token.is_cancelled());
    let finished = writer.finish();
    let closed = reader.close();
    let copied = copied?;
    finished?;
    closed?;
    Ok(copied)
}

fn import_files(
    ctx: &TaskContext,
    volume: &dyn EncryptedVolume,
    dst_paths: &[String],
    sources: &[Box<dyn ExternalTree>],
    progress: &mut ProgressScope<'_>,
) -> Result<TaskResult<String>, EngineError> {
    let mut buf = vec![0_u8; ctx.config.io_chunk_size];
    for (dst, source) in dst_paths.iter().zip(sources) {
        if ctx.is_cancelled() {
            return Ok(TaskResult::Cancelled);
        }
        match import_one(volume, source.as_ref(), dst, &mut buf, &ctx.token)? {
            TreeOutcome::Complete => progress.advance(),
            other => return Ok(tree_result(other)),
        }
    }
    Ok(TaskResult::Success)
}

fn import_one(
    volume: &dyn EncryptedVolume,
    source: &dyn ExternalTree,
    dst: &str,
    buf: &mut [u8],
    token: &CancelToken,
) -> Result<TreeOutcome, EngineError> {
    let mut reader = match source.open_for_read() {
        Ok(reader) => reader,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(source = %source.id(), "Import source not found");
            return Ok(TreeOutcome::Failed(source.id()));
        }
        Err(e) => {
            return Err(EngineError::ExternalRead {
                id: source.id(),
                source: e,
            });
        }
    };
    let mut writer = match VolumeWriter::create(volume, dst) {
        Ok(writer) => writer,
        Err(e) => {
            warn!(source = %source.id(), dst, error = %e, "Cannot create import destination");
            return Ok(TreeOutcome::Failed(source.id()));
        }
    };
    let copied = copy_chunks(&mut reader, &mut writer, buf, || token.is_cancelled());
    let finished = writer.finish();
    Ok(match (copied, finished) {
        (Ok(Copied::Complete(bytes)), Ok(_)) => {
            debug!(source = %source.id(), dst, bytes, "Imported");
            TreeOutcome::Complete
        }
        (Ok(Copied::Cancelled(_)), _) => TreeOutcome::Cancelled,
        (Err(e), _) => {
            warn!(source = %source.id(), dst, error = %e, "Import failed");
            TreeOutcome::Failed(source.id())
        }
        (Ok(Copied::Complete(_)), Err(e)) => {
            warn!(source = %source.id(), dst, error = %e, "Import failed");
            TreeOutcome::Failed(source.id())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoProgress;
    use oxvault_core::MemoryVolume;
    use oxvault_core::testing::assert_volume_file;

    fn engine_with(volume: MemoryVolume) -> (FileOperationEngine, VolumeId) {
        let manager = Arc::new(VolumeManager::new());
        let id = manager
            .insert(
                Arc::new(volume),
                crate::VolumeData::new("mem", "/mem", crate::VolumeKind::Memory),
            )
            .unwrap();
        let engine = FileOperationEngine::new(manager, Arc::new(NoProgress), EngineConfig::default());
        (engine, id)
    }

    #[tokio::test]
    async fn test_copy_within_volume() {
        let volume = MemoryVolume::new();
        volume.put_file("/a/x.txt", b"hello");
        let (engine, id) = engine_with(volume);
        let items = vec![
            OperationFile::new("/a", oxvault_core::FileType::Directory).with_dst("/b"),
            OperationFile::new("/a/x.txt", oxvault_core::FileType::RegularFile).with_dst("/b/x.txt"),
        ];
        let result = engine.copy_elements(id, items, None).join().await;
        assert_eq!(result, TaskResult::Success);
        let volume = engine.manager().get_volume(id).unwrap();
        assert_volume_file(volume.as_ref(), "/b/x.txt", b"hello");
        assert!(engine.running_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_missing_destination_is_an_error() {
        let volume = MemoryVolume::new();
        volume.put_file("/x", b"1");
        let (engine, id) = engine_with(volume);
        let items = vec![OperationFile::new("/x", oxvault_core::FileType::RegularFile)];
        let result = engine.copy_elements(id, items, None).join().await;
        assert_eq!(result.error_message(), Some("item /x has no destination"));
    }

    #[tokio::test]
    async fn test_unknown_volume_is_an_error() {
        let (engine, id) = engine_with(MemoryVolume::new());
        let bogus = VolumeId::from_raw(99);
        let result = engine.remove_elements(bogus, Vec::new()).join().await;
        assert!(result.error_message().is_some_and(|m| m.contains("vol#99")));

        let result = engine.copy_elements(id, Vec::new(), Some(bogus)).join().await;
        assert!(matches!(result, TaskResult::Error(_)));
        assert!(engine.running_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_length_mismatch_is_an_error() {
        let (engine, id) = engine_with(MemoryVolume::new());
        let result = engine
            .import_files_from_uris(id, vec!["/a".into()], Vec::new())
            .join()
            .await;
        assert!(matches!(result, TaskResult::Error(_)));
    }

    #[test]
    fn test_outcome_display() {
        let outcome = ImportOutcome {
            result: TaskResult::Failed("/host/b".into()),
            sources: vec!["/host/a".into(), "/host/b".into()],
        };
        assert_eq!(outcome.to_string(), "failed at /host/b (2 sources)");
        let clone = CloneOutcome::from_error("boom".into());
        assert_eq!(clone.to_string(), "error: boom");
    }
}
