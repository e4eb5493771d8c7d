//! Clone command - copy the whole volume tree into a host directory.
//!
//! The copy lands in `<DEST>/<volume name>`.
//!
//! # Examples
//!
//! ```bash
//! oxvault clone ~/vault /mnt/backup
//! ```

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args as ClapArgs;
use tracing::{info, instrument};

use oxvault_ops::{HostNode, TaskState};

use super::report;
use crate::session::Session;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Existing host directory that receives the copy
    pub dest: PathBuf,
}

#[instrument(level = "info", name = "cmd::clone", skip_all, fields(dest = %args.dest.display()))]
pub fn execute(session: &Session, args: &Args) -> Result<TaskState> {
    if !args.dest.is_dir() {
        bail!("Clone destination is not a directory: {}", args.dest.display());
    }
    let root = session.volume().root();
    if args.dest.starts_with(root) {
        bail!("Clone destination is inside the volume: {}", args.dest.display());
    }

    let task = session
        .engine()
        .copy_volume(HostNode::tree(root), HostNode::tree(&args.dest));
    let outcome = session.wait(task);
    if let Some(created) = &outcome.created {
        info!(created = %created.id(), "Clone created");
    }
    Ok(report(&outcome.result))
}
