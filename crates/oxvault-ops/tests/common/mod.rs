//! Common utilities for engine integration tests.

#![allow(dead_code)]

pub mod harness;
pub mod progress;

pub use harness::{Harness, host_tree, init_tracing};
pub use progress::{Event, RecordingProgress};
