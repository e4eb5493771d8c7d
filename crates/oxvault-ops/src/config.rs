//! Engine configuration.
//!
//! Every field has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! io_chunk_size = 65536
//! wipe_passes = 3
//! ```

use std::path::{Path, PathBuf};

use oxvault_core::{DEFAULT_IO_CHUNK_SIZE, MAX_KERNEL_WRITE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wipe::{DEFAULT_WIPE_BUFFER_SIZE, WIPE_PASSES};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for [`FileOperationEngine`](crate::FileOperationEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Buffer size for streamed copies.
    ///
    /// Default: 16 KiB. At most [`MAX_KERNEL_WRITE`].
    pub io_chunk_size: usize,

    /// Zero-fill passes per wiped file. Default: 2.
    pub wipe_passes: u32,

    /// Size of the zero buffer used while wiping. Default: 4 KiB.
    pub wipe_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            io_chunk_size: DEFAULT_IO_CHUNK_SIZE,
            wipe_passes: WIPE_PASSES,
            wipe_buffer_size: DEFAULT_WIPE_BUFFER_SIZE,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_KERNEL_WRITE).contains(&self.io_chunk_size) {
            return Err(ConfigError::Invalid(format!(
                "io_chunk_size must be between 1 and {MAX_KERNEL_WRITE}, got {}",
                self.io_chunk_size
            )));
        }
        if self.wipe_passes == 0 {
            return Err(ConfigError::Invalid("wipe_passes must be at least 1".into()));
        }
        if self.wipe_buffer_size == 0 {
            return Err(ConfigError::Invalid("wipe_buffer_size must be positive".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn io_chunk_size(mut self, size: usize) -> Self {
        self.io_chunk_size = size;
        self
    }

    #[must_use]
    pub fn wipe_passes(mut self, passes: u32) -> Self {
        self.wipe_passes = passes;
        self
    }

    #[must_use]
    pub fn wipe_buffer_size(mut self, size: usize) -> Self {
        self.wipe_buffer_size = size;
        self
    }
}
