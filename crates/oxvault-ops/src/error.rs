//! Error types for the operation layer.
//!
//! Per-item failures are not errors here: they end a task as
//! [`TaskResult::Failed`](crate::TaskResult::Failed). [`EngineError`] covers
//! what escapes the per-item logic and becomes
//! [`TaskResult::Error`](crate::TaskResult::Error) at the task boundary.

use std::io;

use oxvault_core::VolumeError;
use thiserror::Error;

use crate::manager::VolumeId;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown volume {0}")]
    UnknownVolume(VolumeId),

    #[error("volume {0} was closed before the task ran")]
    VolumeClosed(VolumeId),

    #[error("item {path} has no destination")]
    MissingDestination { path: String },

    #[error("{destinations} destinations for {sources} sources")]
    LengthMismatch { destinations: usize, sources: usize },

    #[error("reading {id} failed: {source}")]
    ExternalRead {
        id: String,
        #[source]
        source: io::Error,
    },

    #[error("walking {id} failed: {source}")]
    Walk {
        id: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error("failed to start worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("task dropped before completion")]
    Dropped,

    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Why a selection could not be planned.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("selected path {path} does not exist")]
    NotFound { path: String },

    #[error("cannot list {path}")]
    ListFailed { path: String },

    #[error("{path} is not inside {src_dir}")]
    OutsideSource { path: String, src_dir: String },

    #[error("cannot copy or move {src} into itself ({dst})")]
    IntoItself { src: String, dst: String },
}

/// Turn a panic payload into a message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
