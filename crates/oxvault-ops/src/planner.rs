//! Turns a user selection into the flat item lists the engine consumes.
//!
//! The engine never walks directories on its own for copy and move: it
//! trusts the order it is given. Planning here guarantees that a directory
//! always precedes everything nested in it.

use oxvault_core::path;
use oxvault_core::{EncryptedVolume, VolumeExt};
use tracing::debug;

use crate::error::PlanError;
use crate::operation_file::OperationFile;

/// Items to rename plus source directories to remove once they are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovePlan {
    pub to_move: Vec<OperationFile>,
    /// Merged source directories, parents before children.
    pub to_clean: Vec<OperationFile>,
}

fn destination(src_dir: &str, src: &str, dst_dir: &str) -> Result<String, PlanError> {
    let rel = path::relative_path(src_dir, src).ok_or_else(|| PlanError::OutsideSource {
        path: src.to_string(),
        src_dir: src_dir.to_string(),
    })?;
    Ok(path::path_join(&[dst_dir, rel]))
}

fn stat_item<V: EncryptedVolume + ?Sized>(
    volume: &V,
    src: &str,
) -> Result<OperationFile, PlanError> {
    let stat = volume.get_attr(src).ok_or_else(|| PlanError::NotFound {
        path: src.to_string(),
    })?;
    Ok(OperationFile::new(src, stat.file_type))
}

fn check_not_into_itself(item: &OperationFile, dst_dir: &str) -> Result<(), PlanError> {
    if item.is_directory() && path::is_child_of(dst_dir, &item.src_path) {
        return Err(PlanError::IntoItself {
            src: item.src_path.clone(),
            dst: dst_dir.to_string(),
        });
    }
    Ok(())
}

/// Flatten `selection` (paths inside `src_dir`) into copy items targeting
/// `dst_dir`, descending into directories.
pub fn plan_copy<V: EncryptedVolume + ?Sized, S: AsRef<str>>(
    volume: &V,
    selection: &[S],
    src_dir: &str,
    dst_dir: &str,
) -> Result<Vec<OperationFile>, PlanError> {
    let mut items = Vec::new();
    for selected in selection {
        let item = stat_item(volume, selected.as_ref())?;
        check_not_into_itself(&item, dst_dir)?;
        let dst = destination(src_dir, &item.src_path, dst_dir)?;
        let is_dir = item.is_directory();
        let src = item.src_path.clone();
        items.push(item.with_dst(dst));

        if is_dir {
            let entries = volume
                .recursive_map_files(&src)
                .ok_or_else(|| PlanError::ListFailed { path: src.clone() })?;
            for entry in &entries {
                let child = OperationFile::from_entry(entry);
                let dst = destination(src_dir, &child.src_path, dst_dir)?;
                items.push(child.with_dst(dst));
            }
        }
    }
    debug!(items = items.len(), "Planned copy");
    Ok(items)
}

/// Plan moving `selection` into `dst_dir`.
///
/// A directory whose destination already exists as a directory is merged:
/// its children are planned one level down and the directory itself lands in
/// `to_clean`.
pub fn plan_move<V: EncryptedVolume + ?Sized, S: AsRef<str>>(
    volume: &V,
    selection: &[S],
    src_dir: &str,
    dst_dir: &str,
) -> Result<MovePlan, PlanError> {
    let mut plan = MovePlan::default();
    for selected in selection {
        let item = stat_item(volume, selected.as_ref())?;
        check_not_into_itself(&item, dst_dir)?;
        plan_move_item(volume, item, src_dir, dst_dir, &mut plan)?;
    }
    debug!(
        to_move = plan.to_move.len(),
        to_clean = plan.to_clean.len(),
        "Planned move"
    );
    Ok(plan)
}

fn plan_move_item<V: EncryptedVolume + ?Sized>(
    volume: &V,
    item: OperationFile,
    src_dir: &str,
    dst_dir: &str,
    plan: &mut MovePlan,
) -> Result<(), PlanError> {
    let dst = destination(src_dir, &item.src_path, dst_dir)?;
    let merge = item.is_directory() && volume.get_attr(&dst).is_some_and(|s| s.is_directory());
    if !merge {
        plan.to_move.push(item.with_dst(dst));
        return Ok(());
    }

    let entries = volume
        .read_dir(&item.src_path)
        .map_err(|_| PlanError::ListFailed {
            path: item.src_path.clone(),
        })?;
    plan.to_clean.push(item.with_dst(dst));
    for entry in entries.iter().filter(|e| !e.is_parent_marker()) {
        plan_move_item(volume, OperationFile::from_entry(entry), src_dir, dst_dir, plan)?;
    }
    Ok(())
}

/// Indices of items whose destination exists and whose overwrite has not
/// been confirmed. Existing directories are merge targets, not conflicts.
pub fn conflicts<V: EncryptedVolume + ?Sized>(volume: &V, items: &[OperationFile]) -> Vec<usize> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| !item.overwrite_confirmed)
        .filter(|(_, item)| {
            item.dst_path
                .as_deref()
                .and_then(|dst| volume.get_attr(dst))
                .is_some_and(|stat| !(item.is_directory() && stat.is_directory()))
        })
        .map(|(i, _)| i)
        .collect()
}

/// Destination paths for importing flat sources named `names` into `dst_dir`.
pub fn plan_import<S: AsRef<str>>(dst_dir: &str, names: &[S]) -> Vec<String> {
    names
        .iter()
        .map(|name| path::path_join(&[dst_dir, name.as_ref()]))
        .collect()
}
