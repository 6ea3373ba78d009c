use clap::{Args, Parser, Subcommand};
use hash_herder_core::{DispositionMode, IdentityPolicy};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "hash-herder")]
#[command(about = "Content-addressed file deduplication and classification", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file layered over the defaults and user config
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log level or filter directive (overrides logging.level)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Remove or move files whose content is already indexed
    Dedup(DedupArgs),
    /// Sort files into category/part_NNNN shards under a destination
    Classify(ClassifyArgs),
    /// Write a default configuration file to the user config directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct DedupArgs {
    /// Directories to scan, in order
    #[arg(required = true, value_name = "DIR")]
    pub dirs: Vec<PathBuf>,

    /// What to do with duplicates: delete or move
    #[arg(short, long, value_name = "MODE")]
    pub mode: Option<DispositionMode>,

    /// Where duplicates go in move mode
    #[arg(short = 't', long = "target-dir", value_name = "DIR")]
    pub target_dir: Option<PathBuf>,

    /// Index database path
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Skip files recorded by an interrupted run
    #[arg(short, long)]
    pub resume: bool,

    /// Discard saved progress before scanning
    #[arg(short = 'R', long)]
    pub reset: bool,

    /// Report what would happen without touching anything
    #[arg(long)]
    pub dry_run: bool,

    /// Log every file, including skipped ones
    #[arg(short, long)]
    pub verbose: bool,

    /// Hashing threads; 1 hashes on the scanning thread
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,

    /// How a hash match is confirmed: hash, hash-size or full
    #[arg(long, value_name = "POLICY")]
    pub identity: Option<IdentityPolicy>,
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Source directories followed by the destination directory
    #[arg(num_args = 2.., required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Maximum files per part_NNNN directory
    #[arg(short = 'n', long, value_name = "N")]
    pub files_per_dir: Option<usize>,

    /// Copy files instead of moving them
    #[arg(long)]
    pub copy: bool,

    /// Persist per-category counts in the database
    #[arg(long)]
    pub track_counts: bool,

    /// Database used by --track-counts
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,
}

impl ClassifyArgs {
    /// Split the positional paths into sources and destination.
    pub fn split(&self) -> Option<(&[PathBuf], &PathBuf)> {
        let (dest, sources) = self.paths.split_last()?;
        Some((sources, dest))
    }
}
