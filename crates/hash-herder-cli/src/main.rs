mod commands;
mod logging;
mod progress;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{ClassifyArgs, Cli, Commands, DedupArgs};
use dotenv::dotenv;
use hash_herder_core::classifier::TransferMode;
use hash_herder_core::config::{self, AppConfig};
use hash_herder_core::storage::Database;
use hash_herder_core::{
    Classifier, ClassifierStats, ClassifyOptions, DedupEngine, DedupOptions, ExistenceIndex,
    InterruptHandle, ProcessStats,
};
use humansize::{format_size, BINARY};
use progress::CliReporter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let args = Cli::parse();

    let config = match config::load_configuration(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} loading configuration: {}", "Error".red().bold(), err);
            process::exit(1);
        }
    };
    if let Err(err) = config.validate() {
        eprintln!("{} {}", "Error:".red().bold(), err);
        process::exit(1);
    }

    let verbose = matches!(&args.command, Some(Commands::Dedup(dedup)) if dedup.verbose);
    let _guard = logging::init_logger(&config.logging, args.log_level.as_deref(), verbose);

    let outcome = match args.command {
        Some(Commands::Dedup(dedup)) => run_dedup(&config, dedup),
        Some(Commands::Classify(classify)) => run_classify(&config, classify),
        Some(Commands::Init { force }) => run_init(force),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = outcome {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

/// First Ctrl-C saves progress and stops at the next file; a second one
/// exits immediately.
fn install_interrupt_handler(handle: InterruptHandle) -> Result<()> {
    let presses = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        if presses.fetch_add(1, Ordering::SeqCst) == 0 {
            let flushed = handle.interrupt();
            eprintln!(
                "\n{} Progress saved for {} scan root(s). Finishing the current file, press Ctrl-C again to quit now.",
                "!".yellow().bold(),
                flushed
            );
        } else {
            eprintln!("{}", "Forced exit".red());
            process::exit(130);
        }
    })
    .context("installing Ctrl-C handler")
}

fn open_database_path(configured: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf> {
    let path = configured.unwrap_or_else(|| config.database_path());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    Ok(path)
}

fn run_dedup(config: &AppConfig, args: DedupArgs) -> Result<()> {
    let mut options = DedupOptions::from_config(config);
    if let Some(mode) = args.mode {
        options.mode = mode;
    }
    if let Some(target) = args.target_dir {
        options.target_dir = Some(target);
    }
    if let Some(workers) = args.workers {
        options.workers = workers;
    }
    if let Some(identity) = args.identity {
        options.identity = identity;
    }
    options.resume = args.resume;
    options.reset = args.reset;
    options.dry_run = args.dry_run;
    options.verbose = args.verbose;

    let db_path = open_database_path(args.db, config)?;
    info!("Using index database {}", db_path.display());
    let index = ExistenceIndex::open(&db_path)
        .with_context(|| format!("opening index database {}", db_path.display()))?;

    let engine = DedupEngine::new(Arc::new(index), options)?;
    install_interrupt_handler(engine.interrupt_handle())?;

    if args.dry_run {
        warn!("Dry run: no file, index or ledger will be changed");
    }

    let reporter = CliReporter::new("Hashing");
    let stats = engine.process(&args.dirs, &reporter)?;
    print_dedup_summary(&stats, args.dry_run);
    Ok(())
}

fn print_dedup_summary(stats: &ProcessStats, dry_run: bool) {
    println!();
    if dry_run {
        println!("{}", "Dry run, nothing was changed".yellow().bold());
    }
    if stats.interrupted {
        println!(
            "{}",
            "Scan interrupted, re-run with --resume to continue".yellow().bold()
        );
    }
    let seconds = stats.duration().num_milliseconds() as f64 / 1000.0;
    println!(
        "Processed {} files in {}",
        stats.total_processed.to_string().bold(),
        format!("{:.2}s", seconds).green()
    );
    println!("  New records:     {}", stats.added.to_string().green());
    println!("  Deleted:         {}", stats.deleted.to_string().red());
    println!("  Moved:           {}", stats.moved.to_string().red());
    println!("  Freed:           {}", format_size(stats.freed_space, BINARY).cyan());
    if stats.skipped > 0 {
        println!("  Resumed (skip):  {}", stats.skipped);
    }
    if stats.already_indexed > 0 {
        println!("  Already indexed: {}", stats.already_indexed);
    }
    if stats.collisions > 0 {
        println!("  Hash collisions: {}", stats.collisions.to_string().yellow());
    }
    if stats.failed > 0 {
        println!("  Failed:          {}", stats.failed.to_string().red().bold());
    }
}

fn run_classify(config: &AppConfig, args: ClassifyArgs) -> Result<()> {
    let (sources, dest) = args
        .split()
        .context("classify needs at least one source and a destination")?;

    let mut options = ClassifyOptions::from_config(config);
    if let Some(files_per_dir) = args.files_per_dir {
        options.files_per_dir = files_per_dir;
    }
    if args.copy {
        options.transfer = TransferMode::Copy;
    }

    let mut classifier = Classifier::new(options)?;
    if args.track_counts {
        let db_path = open_database_path(args.db.clone(), config)?;
        info!("Tracking category counts in {}", db_path.display());
        let db = Database::open(&db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;
        classifier = classifier.with_count_store(db);
    }
    install_interrupt_handler(classifier.interrupt_handle())?;

    let reporter = CliReporter::new("Classifying");
    let stats = classifier.classify(sources, dest, &reporter)?;
    print_classify_summary(&stats, dest);
    Ok(())
}

fn print_classify_summary(stats: &ClassifierStats, dest: &Path) {
    println!();
    if stats.interrupted {
        println!("{}", "Classification interrupted".yellow().bold());
    }
    println!(
        "Placed {} of {} files under {} ({:.1}%)",
        stats.processed.to_string().green(),
        stats.total_processed,
        dest.display(),
        stats.success_rate()
    );
    for (category, count) in &stats.per_category {
        println!("  {:<10} {}", category, count.to_string().cyan());
    }
    if stats.unknown_type > 0 {
        println!("  Unknown type: {}", stats.unknown_type.to_string().yellow());
    }
    if stats.failed > 0 {
        println!("  Failed:       {}", stats.failed.to_string().red().bold());
    }
}

fn run_init(force: bool) -> Result<()> {
    let path = config::user_config_path().context("no configuration directory for this user")?;
    if path.exists() && !force {
        warn!(
            "{} already exists, leaving it alone (use --force to overwrite)",
            path.display()
        );
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(&path, config::DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display().to_string().green());
    Ok(())
}
