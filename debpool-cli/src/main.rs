//! Command-line interface for maintaining a debpool APT repository.

use anyhow::Result;
use clap::{Parser, Subcommand};
use debpool::{Repository, SystemRunner};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "debpool", about = "Maintain a Debian-style APT package repository")]
struct Args {
    /// Repository root directory
    #[arg(long, default_value = ".", env = "DEBPOOL_ROOT")]
    root: PathBuf,

    /// Configuration directory (default: <root>/conf)
    #[arg(long, env = "DEBPOOL_CONFDIR")]
    confdir: Option<PathBuf>,

    /// Seconds to wait for the repository lock; 0 fails immediately,
    /// negative waits indefinitely
    #[arg(long, default_value = "0", env = "DEBPOOL_LOCK_TIMEOUT")]
    lock_timeout: i64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the pool and dists directory skeletons
    Init,
    /// Import a binary package into the pool
    ImportDeb {
        /// Path to the .deb file
        file: PathBuf,
        /// Target distribution codename; default is taken from the
        /// package changelog
        #[arg(long)]
        distribution: Option<String>,
        /// Override the package section
        #[arg(long)]
        section: Option<String>,
    },
    /// Import every file declared by an upload manifest
    ImportChanges {
        /// Path to the .changes file
        file: PathBuf,
        /// Target distribution codename; default is the manifest's
        /// Distribution field
        #[arg(long)]
        distribution: Option<String>,
    },
    /// Regenerate the index files of every distribution
    Update {
        /// Delete the dists tree and rebuild it from scratch
        #[arg(long)]
        prune: bool,
    },
    /// Write a detached signature next to every Release manifest
    Sign,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = if args.verbose {
        "debpool=debug,info"
    } else {
        "debpool=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    let mut repo = Repository::open(&args.root, args.confdir.as_deref(), args.lock_timeout)?;

    match args.command {
        Command::Init => {
            // Opening the session already ensured the skeleton.
            info!("repository initialized at '{}'", repo.root().display());
        }
        Command::ImportDeb {
            file,
            distribution,
            section,
        } => {
            repo.import_deb(&file, distribution.as_deref(), section.as_deref())?;
        }
        Command::ImportChanges { file, distribution } => {
            repo.import_changes(&file, distribution.as_deref())?;
        }
        Command::Update { prune } => {
            repo.update_dists(&SystemRunner, prune)?;
        }
        Command::Sign => {
            repo.sign_releases(&SystemRunner)?;
        }
    }
    Ok(())
}
