//! One opened volume plus the engine that runs tasks against it.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use oxvault_core::HostVolume;
use oxvault_ops::{
    EngineConfig, FileOperationEngine, TaskHandle, TaskOutput, TracingProgress, VolumeData,
    VolumeId, VolumeKind, VolumeManager,
};

pub struct Session {
    runtime: Runtime,
    engine: FileOperationEngine,
    volume: Arc<HostVolume>,
    id: VolumeId,
}

impl Session {
    pub fn open(root: &Path, config: EngineConfig) -> Result<Self> {
        let volume = Arc::new(
            HostVolume::open(root)
                .with_context(|| format!("Failed to open volume {}", root.display()))?,
        );
        let name = root
            .file_name()
            .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().into_owned());

        let manager = Arc::new(VolumeManager::new());
        let id = manager
            .insert(volume.clone(), VolumeData::new(name, root, VolumeKind::Plain))
            .context("Failed to register volume")?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("oxvault-rt")
            .enable_all()
            .build()
            .context("Failed to start runtime")?;

        let engine = FileOperationEngine::new(manager, Arc::new(TracingProgress::new()), config);
        debug!(volume = %id, root = %root.display(), "Session opened");
        Ok(Self {
            runtime,
            engine,
            volume,
            id,
        })
    }

    /// Route Ctrl-C to every running task.
    pub fn cancel_on_interrupt(&self) -> Result<()> {
        let tasks = Arc::clone(self.engine.manager().tasks());
        ctrlc::set_handler(move || {
            eprintln!("\nReceived interrupt, cancelling...");
            for task in tasks.running() {
                info!(task = %task.id, kind = %task.kind, "Cancelling on interrupt");
                tasks.cancel(task.id);
            }
        })
        .context("Failed to set signal handler")
    }

    pub fn engine(&self) -> &FileOperationEngine {
        &self.engine
    }

    pub fn volume(&self) -> &HostVolume {
        &self.volume
    }

    pub fn id(&self) -> VolumeId {
        self.id
    }

    /// Block until `task` ends.
    pub fn wait<R: TaskOutput>(&self, task: TaskHandle<R>) -> R {
        self.runtime.block_on(task.join())
    }

    pub fn close(self) {
        self.engine.manager().close_all();
        debug!(volume = %self.id, "Session closed");
    }
}
