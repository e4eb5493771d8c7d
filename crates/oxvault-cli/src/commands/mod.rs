pub mod clone;
pub mod cp;
pub mod export;
pub mod import;
pub mod ls;
pub mod mv;
pub mod rm;
pub mod wipe;

use std::fmt;

use anyhow::{Result, bail};

use oxvault_core::path;
use oxvault_core::{EncryptedVolume, HostVolume};
use oxvault_ops::{OperationFile, TaskResult, TaskState, conflicts};

/// Print the outcome line and hand back its state for the exit code.
pub fn report<T: fmt::Display>(result: &TaskResult<T>) -> TaskState {
    println!("{result}");
    result.state()
}

/// Refuse to replace existing destinations unless `force` is set.
pub fn resolve_conflicts(
    volume: &HostVolume,
    items: &mut [OperationFile],
    force: bool,
) -> Result<()> {
    let clashing = conflicts(volume, items);
    if clashing.is_empty() {
        return Ok(());
    }
    if !force {
        let first = items[clashing[0]].dst_path.as_deref().unwrap_or_default();
        bail!(
            "Destination already exists: {first} ({} conflicts, use --force to overwrite)",
            clashing.len()
        );
    }
    for i in clashing {
        items[i].confirm_overwrite();
    }
    Ok(())
}

/// Normalize `dir` and make sure it is an existing volume directory.
pub fn existing_dir(volume: &HostVolume, dir: &str) -> Result<String> {
    let dir = path::normalize(dir);
    match volume.get_attr(&dir) {
        Some(stat) if stat.is_directory() => Ok(dir),
        Some(_) => bail!("Not a directory: {dir}"),
        None => bail!("Directory not found: {dir}"),
    }
}
