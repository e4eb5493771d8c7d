//! Registry of open volumes.
//!
//! [`VolumeManager`] owns every open [`EncryptedVolume`] and the
//! [`SerialExecutor`] through which all calls into it are routed. It is an
//! ordinary object: construct one per session, share it through `Arc`, and
//! tear it down with [`VolumeManager::close_all`] (or by dropping it).

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use oxvault_core::EncryptedVolume;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::cancel::TaskRegistry;
use crate::error::EngineError;
use crate::executor::{ExecutorStats, JobResult, SerialExecutor};

/// Id of a registered volume. Never reused within one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(u32);

impl VolumeId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vol#{}", self.0)
    }
}

/// Container format behind a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeKind {
    /// Native engine addressed by an in-process handle.
    Native,
    /// Engine addressed by a session id.
    Session,
    /// Plain host directory, no encryption.
    Plain,
    /// Scratch volume held in memory.
    Memory,
}

/// Caller-side description of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeData {
    pub name: String,
    pub path: PathBuf,
    pub kind: VolumeKind,
    pub hidden: bool,
}

impl VolumeData {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, kind: VolumeKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            hidden: false,
        }
    }

    #[must_use]
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

/// One registered volume.
pub(crate) struct VolumeEntry {
    pub(crate) data: VolumeData,
    pub(crate) volume: Arc<dyn EncryptedVolume>,
    pub(crate) executor: SerialExecutor,
}

/// Owns the open volumes of a session.
pub struct VolumeManager {
    entries: DashMap<VolumeId, Arc<VolumeEntry>>,
    next_id: AtomicU32,
    tasks: Arc<TaskRegistry>,
}

impl fmt::Debug for VolumeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeManager")
            .field("volumes", &self.entries.len())
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl Default for VolumeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeManager {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU32::new(1),
            tasks: Arc::new(TaskRegistry::new()),
        }
    }

    /// Register an opened volume and start its worker.
    #[instrument(level = "debug", skip(self, volume), fields(name = %data.name))]
    pub fn insert(
        &self,
        volume: Arc<dyn EncryptedVolume>,
        data: VolumeData,
    ) -> Result<VolumeId, EngineError> {
        let id = VolumeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let executor = SerialExecutor::spawn(format!("oxvault-{id}")).map_err(EngineError::Spawn)?;
        self.entries.insert(
            id,
            Arc::new(VolumeEntry {
                data,
                volume,
                executor,
            }),
        );
        info!(%id, "Volume registered");
        Ok(id)
    }

    /// The volume behind `id`.
    ///
    /// Calls made through this reference bypass the volume's worker; bulk
    /// work should go through the engine or [`run_on`](Self::run_on).
    pub fn get_volume(&self, id: VolumeId) -> Option<Arc<dyn EncryptedVolume>> {
        self.entries.get(&id).map(|e| Arc::clone(&e.volume))
    }

    pub fn get_data(&self, id: VolumeId) -> Option<VolumeData> {
        self.entries.get(&id).map(|e| e.data.clone())
    }

    pub(crate) fn entry(&self, id: VolumeId) -> Option<Arc<VolumeEntry>> {
        self.entries.get(&id).map(|e| Arc::clone(&e))
    }

    /// Run `f` against the volume on its worker, after everything already queued.
    pub fn run_on<R, F>(&self, id: VolumeId, f: F) -> Result<oneshot::Receiver<JobResult<R>>, EngineError>
    where
        R: Send + 'static,
        F: FnOnce(&dyn EncryptedVolume) -> R + Send + 'static,
    {
        let entry = self.entry(id).ok_or(EngineError::UnknownVolume(id))?;
        let volume = Arc::clone(&entry.volume);
        entry
            .executor
            .submit(move || f(volume.as_ref()))
            .map_err(|_| EngineError::VolumeClosed(id))
    }

    /// Job counters of the volume's worker.
    pub fn executor_stats(&self, id: VolumeId) -> Option<ExecutorStats> {
        self.entry(id).map(|entry| entry.executor.stats())
    }

    /// Unregister and close a volume.
    ///
    /// Tasks bound to it are cancelled and the close is queued behind the job
    /// currently running. Blocks until the worker thread has exited, so async
    /// callers should run it inside `spawn_blocking`. Returns `false` if `id`
    /// is unknown.
    #[instrument(level = "debug", skip(self))]
    pub fn close_volume(&self, id: VolumeId) -> bool {
        let Some((_, entry)) = self.entries.remove(&id) else {
            return false;
        };
        self.tasks.cancel_volume(id);

        let volume = Arc::clone(&entry.volume);
        if entry.executor.submit(move || volume.close()).is_err() {
            warn!(%id, "Volume worker already stopped, closing inline");
            entry.volume.close();
        }
        entry.executor.shutdown();
        let stats = entry.executor.stats();
        info!(
            %id,
            name = %entry.data.name,
            jobs = stats.completed,
            panicked = stats.panicked,
            "Volume closed"
        );
        true
    }

    /// Close every volume.
    pub fn close_all(&self) {
        let ids: Vec<VolumeId> = self.entries.iter().map(|e| *e.key()).collect();
        debug!(count = ids.len(), "Closing all volumes");
        for id in ids {
            self.close_volume(id);
        }
    }

    /// Registered volumes ordered by id.
    pub fn list_volumes(&self) -> Vec<(VolumeId, VolumeData)> {
        let mut list: Vec<_> = self
            .entries
            .iter()
            .map(|e| (*e.key(), e.data.clone()))
            .collect();
        list.sort_by_key(|(id, _)| *id);
        list
    }

    pub fn is_open(&self, data: &VolumeData) -> bool {
        self.volume_id(data).is_some()
    }

    pub fn volume_id(&self, data: &VolumeData) -> Option<VolumeId> {
        self.entries
            .iter()
            .find(|e| e.data.name == data.name && e.data.path == data.path)
            .map(|e| *e.key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registry of tasks running on these volumes.
    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }
}

impl Drop for VolumeManager {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            self.close_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxvault_core::{MemoryVolume, VolumeExt};

    fn memory(name: &str) -> (Arc<MemoryVolume>, VolumeData) {
        (
            Arc::new(MemoryVolume::new()),
            VolumeData::new(name, format!("/mem/{name}"), VolumeKind::Memory),
        )
    }

    #[test]
    fn test_ids_never_reused() {
        let manager = VolumeManager::new();
        let (a, data_a) = memory("a");
        let id_a = manager.insert(a, data_a).unwrap();
        assert!(manager.close_volume(id_a));
        let (b, data_b) = memory("b");
        let id_b = manager.insert(b, data_b).unwrap();
        assert_ne!(id_a, id_b);
        assert!(manager.get_volume(id_a).is_none());
    }

    #[test]
    fn test_close_volume_closes_and_removes() {
        let manager = VolumeManager::new();
        let (volume, data) = memory("v");
        let id = manager.insert(volume.clone(), data.clone()).unwrap();
        assert!(manager.is_open(&data));
        assert_eq!(manager.volume_id(&data), Some(id));
        assert_eq!(manager.get_data(id), Some(data.clone()));

        assert!(manager.close_volume(id));
        assert!(volume.is_closed());
        assert!(!manager.is_open(&data));
        assert!(!manager.close_volume(id));
    }

    #[test]
    fn test_list_and_close_all() {
        let manager = VolumeManager::new();
        let mut volumes = Vec::new();
        for name in ["x", "y", "z"] {
            let (volume, data) = memory(name);
            volumes.push(volume.clone());
            manager.insert(volume, data).unwrap();
        }
        let names: Vec<_> = manager
            .list_volumes()
            .into_iter()
            .map(|(_, d)| d.name)
            .collect();
        assert_eq!(names, ["x", "y", "z"]);

        manager.close_all();
        assert!(manager.is_empty());
        assert!(volumes.iter().all(|v| v.is_closed()));
    }

    #[test]
    fn test_drop_closes_volumes() {
        let (volume, data) = memory("dropped");
        {
            let manager = VolumeManager::new();
            manager.insert(volume.clone(), data).unwrap();
        }
        assert!(volume.is_closed());
    }

    #[tokio::test]
    async fn test_run_on_uses_worker() {
        let manager = VolumeManager::new();
        let (volume, data) = memory("w");
        volume.put_file("/f", b"x");
        let id = manager.insert(volume, data).unwrap();
        let exists = manager
            .run_on(id, |v| v.path_exists("/f"))
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert!(exists);
        assert!(matches!(
            manager.run_on(VolumeId::from_raw(99), |_| ()),
            Err(EngineError::UnknownVolume(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_from_async_context_counts_jobs() {
        let manager = Arc::new(VolumeManager::new());
        let (volume, data) = memory("counted");
        let id = manager.insert(volume.clone(), data).unwrap();
        manager.run_on(id, |_| ()).unwrap().await.unwrap().unwrap();
        let panicked = manager.run_on(id, |_| panic!("boom")).unwrap().await.unwrap();
        assert!(panicked.is_err());

        let stats = manager.executor_stats(id).unwrap();
        assert_eq!((stats.submitted, stats.completed, stats.panicked), (2, 1, 1));

        let closer = Arc::clone(&manager);
        let closed = tokio::task::spawn_blocking(move || closer.close_volume(id))
            .await
            .unwrap();
        assert!(closed);
        assert!(volume.is_closed());
        assert!(manager.executor_stats(id).is_none());
    }
}
