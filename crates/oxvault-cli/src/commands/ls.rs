//! List command - list directory contents in a volume.
//!
//! # Examples
//!
//! ```bash
//! # List root directory
//! oxvault ls ~/vault
//!
//! # List with sizes
//! oxvault ls ~/vault -l /documents
//! ```

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use oxvault_core::path::{self, format_size};
use oxvault_core::{EncryptedVolume, FileType};
use oxvault_ops::TaskState;

use super::existing_dir;
use crate::session::Session;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Path within the volume (default: root)
    #[arg(default_value = "/")]
    pub path: String,

    /// Show entry type and size
    #[arg(short, long)]
    pub long: bool,
}

#[instrument(level = "info", name = "cmd::ls", skip_all, fields(path = %args.path))]
pub fn execute(session: &Session, args: &Args) -> Result<TaskState> {
    let volume = session.volume();
    let dir = existing_dir(volume, &args.path)?;

    let mut entries = volume
        .read_dir(&dir)
        .with_context(|| format!("Failed to list {dir}"))?;
    entries.retain(|e| !e.is_parent_marker());
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    for entry in &entries {
        let name = if entry.is_directory() {
            format!("{}{}", entry.name, path::SEPARATOR)
        } else {
            entry.name.clone()
        };
        if args.long {
            let kind = match entry.stat.file_type {
                FileType::Directory => "dir",
                FileType::Symlink => "link",
                _ => "file",
            };
            let size = if entry.is_directory() {
                "-".to_string()
            } else {
                format_size(entry.stat.len())
            };
            println!("{kind:<5} {size:>10}  {name}");
        } else {
            println!("{name}");
        }
    }
    Ok(TaskState::Success)
}
