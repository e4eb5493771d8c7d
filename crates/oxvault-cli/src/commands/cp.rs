//! Copy command - copy files or directories within a volume.
//!
//! # Examples
//!
//! ```bash
//! # Copy a file into a directory
//! oxvault cp ~/vault /notes.txt /archive
//!
//! # Copy several entries, replacing existing files
//! oxvault cp ~/vault /docs /photos /backup --force
//! ```

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use oxvault_core::path;
use oxvault_ops::{TaskState, plan_copy};

use super::{existing_dir, report, resolve_conflicts};
use crate::session::Session;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Entries to copy
    #[arg(required = true, num_args = 1..)]
    pub sources: Vec<String>,

    /// Destination directory
    pub dest: String,

    /// Overwrite existing files
    #[arg(short, long)]
    pub force: bool,
}

#[instrument(level = "info", name = "cmd::cp", skip_all, fields(sources = args.sources.len(), dest = %args.dest))]
pub fn execute(session: &Session, args: &Args) -> Result<TaskState> {
    let volume = session.volume();
    let dest = existing_dir(volume, &args.dest)?;

    let mut items = Vec::new();
    for source in &args.sources {
        let source = path::normalize(source);
        let parent = path::parent_path(&source);
        items.extend(plan_copy(volume, &[source.as_str()], &parent, &dest)?);
    }
    resolve_conflicts(volume, &mut items, args.force)?;

    let task = session.engine().copy_elements(session.id(), items, None);
    Ok(report(&session.wait(task)))
}
