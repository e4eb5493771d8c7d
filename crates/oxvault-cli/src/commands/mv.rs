//! Move command - move files or directories within a volume.
//!
//! Directories that already exist at the destination are merged.
//!
//! # Examples
//!
//! ```bash
//! oxvault mv ~/vault /inbox/report.pdf /archive
//! ```

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use oxvault_core::path;
use oxvault_ops::{MovePlan, TaskState, plan_move};

use super::{existing_dir, report, resolve_conflicts};
use crate::session::Session;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Entries to move
    #[arg(required = true, num_args = 1..)]
    pub sources: Vec<String>,

    /// Destination directory
    pub dest: String,

    /// Overwrite existing files
    #[arg(short, long)]
    pub force: bool,
}

#[instrument(level = "info", name = "cmd::mv", skip_all, fields(sources = args.sources.len(), dest = %args.dest))]
pub fn execute(session: &Session, args: &Args) -> Result<TaskState> {
    let volume = session.volume();
    let dest = existing_dir(volume, &args.dest)?;

    let mut plan = MovePlan::default();
    for source in &args.sources {
        let source = path::normalize(source);
        let parent = path::parent_path(&source);
        let part = plan_move(volume, &[source.as_str()], &parent, &dest)?;
        plan.to_move.extend(part.to_move);
        plan.to_clean.extend(part.to_clean);
    }
    resolve_conflicts(volume, &mut plan.to_move, args.force)?;

    let task = session
        .engine()
        .move_elements(session.id(), plan.to_move, plan.to_clean);
    Ok(report(&session.wait(task)))
}
