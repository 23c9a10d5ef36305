//! linkback CLI - incremental snapshots linked to their predecessors

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli_lib::cmd;
use cli_lib::cmd::exclude::ExcludeAction;
use cli_lib::config::Config;
use cli_lib::{logging, util};
use std::path::PathBuf;

/// linkback - Incremental snapshots driven by the filesystem change journal
#[derive(Parser)]
#[command(name = "linkback")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// More logging (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors, no progress spinner
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Configuration file layered over the user and target configs
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a snapshot of SOURCE into TARGET/NAME
    Snapshot {
        /// Directory to snapshot
        source: PathBuf,
        /// Directory holding the snapshots and their index
        target: PathBuf,
        /// Snapshot name (default: local time, YYYYMMDD-HHMMSS)
        name: Option<String>,
        /// Copy everything instead of consulting the change journal
        #[arg(long)]
        no_journal: bool,
        /// Link unchanged directories, not only files
        #[arg(long)]
        reuse_dirs: bool,
    },
    /// Show the previous snapshot, journal cursor and exclusions
    Status {
        target: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage excluded paths
    Exclude {
        target: PathBuf,
        #[command(subcommand)]
        action: ExcludeCommand,
    },
}

#[derive(Subcommand)]
enum ExcludeCommand {
    /// Exclude a path (and everything below it)
    Add { path: PathBuf },
    /// Stop excluding a path
    Remove { path: PathBuf },
    /// List excluded paths
    List,
}

impl Commands {
    fn target(&self) -> &PathBuf {
        match self {
            Commands::Snapshot { target, .. }
            | Commands::Status { target, .. }
            | Commands::Exclude { target, .. } => target,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let target = util::absolute_path(cli.command.target())?;
    let mut config = Config::resolve(Some(target.as_path()), cli.config.as_deref())?;

    let verbosity = if cli.quiet { -1 } else { cli.verbose.min(2) as i8 };
    let _log_guard = logging::init(&config.log, verbosity, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Snapshot {
            source,
            name,
            no_journal,
            reuse_dirs,
            ..
        } => {
            if no_journal {
                config.snapshot.use_journal = false;
            }
            if reuse_dirs {
                config.snapshot.reuse_directories = true;
            }
            cmd::snapshot::run(&source, &target, name, &config, !cli.quiet)
        }
        Commands::Status { json, .. } => cmd::status::run(&target, json),
        Commands::Exclude { action, .. } => {
            let action = match &action {
                ExcludeCommand::Add { path } => ExcludeAction::Add(path),
                ExcludeCommand::Remove { path } => ExcludeAction::Remove(path),
                ExcludeCommand::List => ExcludeAction::List,
            };
            cmd::exclude::run(&target, action)
        }
    }
}
