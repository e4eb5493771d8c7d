//! Import command - copy host files and directories into a volume.
//!
//! # Examples
//!
//! ```bash
//! # Import two files into /inbox
//! oxvault import ~/vault a.pdf b.pdf --to /inbox
//!
//! # Import a directory tree and wipe the plaintext copy afterwards
//! oxvault import ~/vault ~/scans --wipe-sources
//! ```

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args as ClapArgs;
use tracing::{info, instrument};

use oxvault_ops::{HostNode, TaskResult, TaskState, plan_import};

use super::{existing_dir, report};
use crate::session::Session;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Host files or directories to import
    #[arg(required = true, num_args = 1..)]
    pub sources: Vec<PathBuf>,

    /// Volume directory to import into
    #[arg(long, default_value = "/")]
    pub to: String,

    /// Wipe the host sources once everything was imported
    #[arg(long)]
    pub wipe_sources: bool,
}

#[instrument(level = "info", name = "cmd::import", skip_all, fields(sources = args.sources.len(), to = %args.to))]
pub fn execute(session: &Session, args: &Args) -> Result<TaskState> {
    let dest = existing_dir(session.volume(), &args.to)?;

    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for source in &args.sources {
        if source.is_dir() {
            dirs.push(source.clone());
        } else if source.is_file() {
            files.push(source.clone());
        } else {
            bail!("Source not found: {}", source.display());
        }
    }

    // Wipe jobs to run once every import succeeded: (files, directory root)
    let mut to_wipe: Vec<(Vec<String>, Option<PathBuf>)> = Vec::new();

    if !files.is_empty() {
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
            .collect();
        let dst_paths = plan_import(&dest, &names);
        let sources = files.iter().map(HostNode::tree).collect();
        let task = session
            .engine()
            .import_files_from_uris(session.id(), dst_paths, sources);
        let result = session.wait(task);
        if !result.is_success() {
            return Ok(report(&result));
        }
        to_wipe.push((files.iter().map(|f| f.display().to_string()).collect(), None));
    }

    for dir in dirs {
        let task = session
            .engine()
            .import_directory(session.id(), dest.clone(), HostNode::tree(&dir));
        let outcome = session.wait(task);
        info!(dir = %dir.display(), files = outcome.sources.len(), "Directory imported");
        if !outcome.result.is_success() {
            return Ok(report(&outcome.result));
        }
        to_wipe.push((outcome.sources, Some(dir)));
    }

    if args.wipe_sources {
        for (sources, root) in to_wipe {
            let sources = sources.into_iter().map(HostNode::wipeable).collect();
            let task = session
                .engine()
                .wipe_uris(sources, root.map(HostNode::wipeable));
            let result = session.wait(task);
            if !result.is_success() {
                return Ok(report(&result));
            }
        }
    }

    Ok(report(&TaskResult::<String>::Success))
}
