use anyhow::{Result, bail};
use clap::Args as ClapArgs;
use tracing::instrument;

use oxvault_core::path;
use oxvault_core::EncryptedVolume;
use oxvault_ops::{OperationFile, TaskState};

use super::report;
use crate::session::Session;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Paths to remove
    #[arg(required = true, num_args = 1..)]
    pub paths: Vec<String>,

    /// Remove directories and their contents recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Ignore nonexistent paths
    #[arg(short, long)]
    pub force: bool,
}

#[instrument(level = "info", name = "cmd::rm", skip_all, fields(paths = args.paths.len(), recursive = args.recursive))]
pub fn execute(session: &Session, args: &Args) -> Result<TaskState> {
    let volume = session.volume();

    let mut items = Vec::new();
    for raw in &args.paths {
        let target = path::normalize(raw);
        if target == "/" {
            bail!("Refusing to remove the volume root");
        }
        match volume.get_attr(&target) {
            Some(stat) if stat.is_directory() && !args.recursive => {
                bail!("Is a directory: {target} (use -r)");
            }
            Some(stat) => items.push(OperationFile::new(target, stat.file_type)),
            None if args.force => {}
            None => bail!("Path not found: {target}"),
        }
    }
    if items.is_empty() {
        return Ok(TaskState::Success);
    }

    let task = session.engine().remove_elements(session.id(), items);
    Ok(report(&session.wait(task)))
}
