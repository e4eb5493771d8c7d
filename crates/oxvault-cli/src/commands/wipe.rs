//! Wipe command - overwrite host files with zeros before deleting them.
//!
//! Paths are resolved against the volume root. Without paths, every file in
//! the root is wiped and the root directory itself is removed.
//!
//! # Examples
//!
//! ```bash
//! # Wipe two plaintext leftovers
//! oxvault wipe ~/staging report.pdf scans/page1.png
//!
//! # Wipe a whole staging directory
//! oxvault wipe ~/staging --all
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args as ClapArgs;
use tracing::instrument;

use oxvault_ops::{HostNode, TaskState, walk_tree};

use super::report;
use crate::session::Session;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Files to wipe, relative to the volume root
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub paths: Vec<PathBuf>,

    /// Wipe every file under the volume root, then remove the root
    #[arg(long)]
    pub all: bool,
}

#[instrument(level = "info", name = "cmd::wipe", skip_all, fields(paths = args.paths.len(), all = args.all))]
pub fn execute(session: &Session, args: &Args) -> Result<TaskState> {
    let root = session.volume().root().to_path_buf();

    let (files, remove_root) = if args.all {
        (files_under(&root)?, Some(root.clone()))
    } else {
        let mut files = Vec::with_capacity(args.paths.len());
        for rel in &args.paths {
            let file = root.join(rel);
            if !file.is_file() {
                bail!("Not a file: {}", file.display());
            }
            files.push(file);
        }
        (files, None)
    };

    let task = session.engine().wipe_uris(
        files.into_iter().map(HostNode::wipeable).collect(),
        remove_root.map(HostNode::wipeable),
    );
    Ok(report(&session.wait(task)))
}

fn files_under(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk_tree(&HostNode::tree(root), &mut |node, _| {
        if !node.is_directory() {
            files.push(PathBuf::from(node.id()));
        }
    })
    .with_context(|| format!("Failed to list {}", root.display()))?;
    Ok(files)
}
