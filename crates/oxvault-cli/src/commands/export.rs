//! Export command - copy volume files and directories out to the host.
//!
//! # Examples
//!
//! ```bash
//! oxvault export ~/vault /docs /notes.txt --to ~/Desktop
//! ```

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args as ClapArgs;
use tracing::instrument;

use oxvault_core::path;
use oxvault_core::EncryptedVolume;
use oxvault_ops::{HostNode, TaskState};

use super::report;
use crate::session::Session;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Volume paths to export
    #[arg(required = true, num_args = 1..)]
    pub paths: Vec<String>,

    /// Host directory to export into
    #[arg(long)]
    pub to: PathBuf,
}

#[instrument(level = "info", name = "cmd::export", skip_all, fields(paths = args.paths.len(), to = %args.to.display()))]
pub fn execute(session: &Session, args: &Args) -> Result<TaskState> {
    if !args.to.is_dir() {
        bail!("Export destination is not a directory: {}", args.to.display());
    }

    let mut paths = Vec::with_capacity(args.paths.len());
    for raw in &args.paths {
        let normalized = path::normalize(raw);
        if session.volume().get_attr(&normalized).is_none() {
            bail!("Path not found: {normalized}");
        }
        paths.push(normalized);
    }

    let task = session
        .engine()
        .export_files(session.id(), paths, HostNode::tree(&args.to));
    Ok(report(&session.wait(task)))
}
