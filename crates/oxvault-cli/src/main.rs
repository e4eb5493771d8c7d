#![deny(unsafe_code)]

mod commands;
mod config;
mod exit_code;
mod session;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use oxvault_ops::TaskState;

use crate::commands::{clone, cp, export, import, ls, mv, rm, wipe};
use crate::session::Session;

/// Bulk file operations on oxvault volumes
#[derive(Parser)]
#[command(name = "oxvault")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # List the volume root
    oxvault ls ~/vault /

    # Copy a directory inside the volume
    oxvault cp ~/vault /docs /backup

    # Import host files, then wipe the plaintext originals
    oxvault import ~/vault ~/Downloads/report.pdf --to /inbox --wipe-sources

    # Clone the whole volume next to a backup directory
    oxvault clone ~/vault /mnt/backup
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Engine configuration file (default: <config dir>/oxvault/config.toml)
    #[arg(long, value_name = "FILE", env = "OXVAULT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List directory contents
    Ls(VolumeCommand<ls::Args>),

    /// Copy files or directories within the volume
    Cp(VolumeCommand<cp::Args>),

    /// Move files or directories within the volume
    Mv(VolumeCommand<mv::Args>),

    /// Remove files or directories
    Rm(VolumeCommand<rm::Args>),

    /// Import host files or directories into the volume
    Import(VolumeCommand<import::Args>),

    /// Export volume files to a host directory
    Export(VolumeCommand<export::Args>),

    /// Overwrite host files with zeros and delete them
    Wipe(VolumeCommand<wipe::Args>),

    /// Copy the whole volume directory tree into a host directory
    Clone(VolumeCommand<clone::Args>),
}

/// Wrapper for commands that take the volume root first.
#[derive(clap::Args)]
pub struct VolumeCommand<T: clap::Args> {
    /// Host directory backing the volume
    #[arg(value_name = "VOLUME")]
    pub volume: PathBuf,

    #[command(flatten)]
    pub args: T,
}

fn main() -> ExitCode {
    match run() {
        Ok(state) => ExitCode::from(exit_code::for_state(state)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code::GENERAL_ERROR)
        }
    }
}

fn run() -> Result<TaskState> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let engine_config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Ls(cmd) => execute_volume_command(&cmd, engine_config, ls::execute),
        Commands::Cp(cmd) => execute_volume_command(&cmd, engine_config, cp::execute),
        Commands::Mv(cmd) => execute_volume_command(&cmd, engine_config, mv::execute),
        Commands::Rm(cmd) => execute_volume_command(&cmd, engine_config, rm::execute),
        Commands::Import(cmd) => execute_volume_command(&cmd, engine_config, import::execute),
        Commands::Export(cmd) => execute_volume_command(&cmd, engine_config, export::execute),
        Commands::Wipe(cmd) => execute_volume_command(&cmd, engine_config, wipe::execute),
        Commands::Clone(cmd) => execute_volume_command(&cmd, engine_config, clone::execute),
    }
}

/// Open the volume, run `f` against it and close it again.
fn execute_volume_command<T, F>(
    cmd: &VolumeCommand<T>,
    engine_config: oxvault_ops::EngineConfig,
    f: F,
) -> Result<TaskState>
where
    T: clap::Args,
    F: FnOnce(&Session, &T) -> Result<TaskState>,
{
    let session = Session::open(&cmd.volume, engine_config)?;
    session.cancel_on_interrupt()?;
    let state = f(&session, &cmd.args);
    session.close();
    state
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}
