//! Engine configuration lookup.
//!
//! An explicit `--config FILE` must exist. Otherwise `config.toml` is read from
//! `$OXVAULT_CONFIG_DIR` or the platform config directory when present, and
//! the built-in defaults apply when it is not.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use oxvault_ops::EngineConfig;

const CONFIG_FILE: &str = "config.toml";

/// Directory holding `config.toml`.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = env::var_os("OXVAULT_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }
    directories::ProjectDirs::from("dev", "agucova", "oxvault")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

pub fn load(explicit: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = explicit {
        return EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }

    let Some(path) = config_dir().map(|dir| dir.join(CONFIG_FILE)) else {
        debug!("No config directory, using defaults");
        return Ok(EngineConfig::default());
    };
    if !path.is_file() {
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(EngineConfig::default());
    }
    EngineConfig::load(&path).with_context(|| format!("Failed to load config {}", path.display()))
}
