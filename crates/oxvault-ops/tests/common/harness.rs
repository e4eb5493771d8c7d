//! Engine harness: a manager, an engine and a recording progress sink.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use oxvault_core::EncryptedVolume;
use oxvault_ops::{
    EngineConfig, FileOperationEngine, VolumeData, VolumeId, VolumeKind, VolumeManager,
};
use tracing_subscriber::EnvFilter;

use super::progress::RecordingProgress;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub manager: Arc<VolumeManager>,
    pub engine: FileOperationEngine,
    pub progress: Arc<RecordingProgress>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(EngineConfig::default(), None)
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(config, None)
    }

    /// Tasks get cancelled once `done` items are reported.
    pub fn cancelling_at(done: usize) -> Self {
        Self::build(EngineConfig::default(), Some(done))
    }

    fn build(config: EngineConfig, cancel_at: Option<usize>) -> Self {
        init_tracing();
        let manager = Arc::new(VolumeManager::new());
        let progress = Arc::new(match cancel_at {
            Some(done) => RecordingProgress::cancelling_at(done, Arc::clone(manager.tasks())),
            None => RecordingProgress::new(),
        });
        let engine = FileOperationEngine::new(Arc::clone(&manager), progress.clone(), config);
        Self {
            manager,
            engine,
            progress,
        }
    }

    pub fn add<V: EncryptedVolume + 'static>(&self, name: &str, volume: &Arc<V>) -> VolumeId {
        let volume: Arc<dyn EncryptedVolume> = volume.clone();
        self.manager
            .insert(volume, VolumeData::new(name, format!("/test/{name}"), VolumeKind::Memory))
            .expect("Failed to register volume")
    }
}

/// Create `files` (relative path, content) under `root`.
pub fn host_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (rel, content) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(&path, content).expect("Failed to write file");
    }
}
