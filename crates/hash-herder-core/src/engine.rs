use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

use crate::config::{self, AppConfig};
use crate::error::Error;
use crate::hasher::pool::DEFAULT_QUEUE_CAPACITY;
use crate::hasher::{hash_file, hex_digest, HashOutcome, HashPool, HashTask, Reorder};
use crate::identity::IdentityPolicy;
use crate::index::ExistenceIndex;
use crate::interrupt::InterruptHandle;
use crate::ledger::{self, ProgressLedger};
use crate::placement;
use crate::progress::ProgressReporter;
use crate::scanner::{self, FileWalker, WalkOptions, WalkedFile};
use crate::storage::models::FileRecord;
use crate::storage::StorageError;

/// What happens to a file whose content is already indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispositionMode {
    #[default]
    Delete,
    Move,
}

impl fmt::Display for DispositionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispositionMode::Delete => f.write_str("delete"),
            DispositionMode::Move => f.write_str("move"),
        }
    }
}

impl FromStr for DispositionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delete" => Ok(DispositionMode::Delete),
            "move" => Ok(DispositionMode::Move),
            other => Err(format!("unknown mode '{other}' (expected delete or move)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DedupOptions {
    pub mode: DispositionMode,
    pub target_dir: Option<PathBuf>,
    pub resume: bool,
    pub reset: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub workers: usize,
    pub identity: IdentityPolicy,
    pub walk: WalkOptions,
    pub ledger_dir: Option<PathBuf>,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            mode: DispositionMode::Delete,
            target_dir: None,
            resume: false,
            reset: false,
            dry_run: false,
            verbose: false,
            workers: 1,
            identity: IdentityPolicy::HashOnly,
            walk: WalkOptions::default(),
            ledger_dir: None,
        }
    }
}

impl DedupOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            mode: config.dedup.mode,
            target_dir: config.dedup.target_dir.as_deref().map(config::expand_tilde),
            workers: config.performance.workers,
            identity: config.dedup.identity,
            walk: WalkOptions {
                ignore_patterns: config.scanner.ignore_patterns.clone(),
                exclude_dirs: Vec::new(),
                skip_empty: config.scanner.skip_empty,
            },
            ledger_dir: config.ledger_dir(),
            ..Self::default()
        }
    }
}

/// Counters for one dedup run. Only the engine's run loop writes them, by
/// folding in each file's `FileOutcome`.
#[derive(Debug, Clone)]
pub struct ProcessStats {
    pub total_processed: u64,
    pub added: u64,
    pub deleted: u64,
    pub moved: u64,
    pub skipped: u64,
    pub already_indexed: u64,
    pub collisions: u64,
    pub failed: u64,
    pub freed_space: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub interrupted: bool,
}

impl ProcessStats {
    fn started() -> Self {
        Self {
            total_processed: 0,
            added: 0,
            deleted: 0,
            moved: 0,
            skipped: 0,
            already_indexed: 0,
            collisions: 0,
            failed: 0,
            freed_space: 0,
            start_time: Utc::now(),
            end_time: None,
            interrupted: false,
        }
    }

    fn record(&mut self, outcome: &FileOutcome) {
        self.total_processed += 1;
        match outcome {
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Added => self.added += 1,
            FileOutcome::Deleted { freed } => {
                self.deleted += 1;
                self.freed_space += freed;
            }
            FileOutcome::Moved { .. } => self.moved += 1,
            FileOutcome::AlreadyIndexed => self.already_indexed += 1,
            FileOutcome::Collision => self.collisions += 1,
            FileOutcome::InsertFailed
            | FileOutcome::DispositionFailed
            | FileOutcome::HashFailed
            | FileOutcome::LookupFailed => self.failed += 1,
        }
    }

    pub fn duplicates(&self) -> u64 {
        self.deleted + self.moved
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time.unwrap_or_else(Utc::now) - self.start_time
    }
}

/// Terminal state of one file in a dedup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Already in the ledger of a resumed scan; not hashed.
    Skipped,
    Added,
    InsertFailed,
    Deleted { freed: u64 },
    Moved { dest: PathBuf },
    DispositionFailed,
    /// The file is the indexed original itself.
    AlreadyIndexed,
    /// Hash matched but the identity policy rejected the match.
    Collision,
    HashFailed,
    LookupFailed,
}

impl FileOutcome {
    /// Hash and lookup failures stay out of the ledger so a resumed scan
    /// retries them.
    fn marks_ledger(&self) -> bool {
        !matches!(
            self,
            FileOutcome::Skipped | FileOutcome::HashFailed | FileOutcome::LookupFailed
        )
    }
}

/// Per-run mutable state, owned by the thread doing disposition.
struct RunState {
    stats: ProcessStats,
    total_files: usize,
    /// Hashes a dry run would have inserted.
    would_add: HashMap<String, FileRecord>,
}

pub struct DedupEngine {
    index: Arc<ExistenceIndex>,
    options: DedupOptions,
    interrupt: InterruptHandle,
}

impl DedupEngine {
    /// Fails before any file is touched when the options are unusable.
    pub fn new(index: Arc<ExistenceIndex>, options: DedupOptions) -> Result<Self, Error> {
        if options.mode == DispositionMode::Move && options.target_dir.is_none() {
            return Err(Error::InvalidConfig(
                "move mode requires a target directory".to_string(),
            ));
        }
        if options.workers == 0 {
            return Err(Error::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        info!("Created dedup engine, mode: {}", options.mode);
        Ok(Self {
            index,
            options,
            interrupt: InterruptHandle::new(),
        })
    }

    /// Handle for the signal handler; see `InterruptHandle::interrupt`.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Walk every directory, indexing first sightings and disposing of
    /// duplicates. Per-file problems are logged and counted, never returned.
    pub fn process(
        &self,
        dirs: &[PathBuf],
        reporter: &dyn ProgressReporter,
    ) -> Result<ProcessStats, Error> {
        let mut roots = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let root = scanner::resolve_path(dir)
                .map_err(|e| Error::path_io("resolve scan root", dir, e))?;
            if !root.is_dir() {
                return Err(Error::InvalidConfig(format!(
                    "scan root {} is not a directory",
                    dir.display()
                )));
            }
            roots.push(root);
        }
        let roots = config::non_overlapping_directories(roots);
        info!(
            "Scan mode: resume={}, reset={}, dry_run={}",
            self.options.resume, self.options.reset, self.options.dry_run
        );

        let target_dir = match &self.options.target_dir {
            Some(dir) => Some(
                scanner::resolve_path(dir)
                    .map_err(|e| Error::path_io("resolve target directory", dir, e))?,
            ),
            None => None,
        };
        if let Some(target) = &target_dir {
            info!("Target directory: {}", target.display());
        }

        let ledgers = self.open_ledgers(&roots);

        let mut walk_options = self.options.walk.clone();
        walk_options.exclude_dirs.extend(target_dir.iter().cloned());
        let walker = FileWalker::new(&walk_options);

        reporter.on_count_start();
        let total_files = walker.count_files(&roots);
        reporter.on_count_complete(total_files);
        info!("Found {} files to process", total_files);

        let mut state = RunState {
            stats: ProcessStats::started(),
            total_files,
            would_add: HashMap::new(),
        };

        if self.options.workers > 1 {
            self.run_parallel(&roots, &ledgers, &walker, target_dir.as_deref(), &mut state, reporter)?;
        } else {
            self.run_sequential(&roots, &ledgers, &walker, target_dir.as_deref(), &mut state, reporter);
        }

        if state.stats.interrupted {
            reporter.on_interrupted(state.stats.total_processed);
            warn!(
                "Interrupted after {}/{} files, progress ledgers kept for --resume",
                state.stats.total_processed, total_files
            );
        } else {
            for ledger in &ledgers {
                if let Err(e) = ledger.close() {
                    error!(
                        "Failed to remove progress ledger {}: {}",
                        ledger.file_path().display(),
                        e
                    );
                }
            }
        }
        self.interrupt.clear();

        let mut stats = state.stats;
        stats.end_time = Some(Utc::now());
        let duration_secs = stats.duration().num_milliseconds() as f64 / 1000.0;
        reporter.on_run_complete(stats.total_processed, duration_secs);
        info!(
            "Processing finished in {:.2}s: total={}, added={}, deleted={}, moved={}, failed={}",
            duration_secs, stats.total_processed, stats.added, stats.deleted, stats.moved, stats.failed
        );
        Ok(stats)
    }

    fn open_ledgers(&self, roots: &[PathBuf]) -> Vec<Arc<ProgressLedger>> {
        let ledger_dir = self.options.ledger_dir.as_deref();
        roots
            .iter()
            .map(|root| {
                if self.options.reset && !self.options.dry_run {
                    if let Err(e) = ledger::remove_stale(root, ledger_dir) {
                        error!("Failed to remove progress ledger for {}: {}", root.display(), e);
                    }
                }

                let ledger = Arc::new(ProgressLedger::open(root, ledger_dir, self.options.dry_run));
                let previous = ledger.processed_count();
                if previous > 0 {
                    info!(
                        "Found unfinished scan of {} ({} files already processed)",
                        root.display(),
                        previous
                    );
                    if !self.options.resume {
                        warn!("Not resuming: every file under {} will be hashed again", root.display());
                    }
                }
                self.interrupt.register(Arc::clone(&ledger));
                ledger
            })
            .collect()
    }

    fn run_sequential(
        &self,
        roots: &[PathBuf],
        ledgers: &[Arc<ProgressLedger>],
        walker: &FileWalker,
        target_dir: Option<&Path>,
        state: &mut RunState,
        reporter: &dyn ProgressReporter,
    ) {
        'roots: for (root, ledger) in roots.iter().zip(ledgers) {
            reporter.on_root_start(&root.to_string_lossy(), ledger.processed_count());
            for file in walker.walk(root) {
                if self.interrupt.is_cancelled() {
                    state.stats.interrupted = true;
                    break 'roots;
                }

                let path_str = file.path.to_string_lossy().into_owned();
                let outcome = if self.options.resume && ledger.is_processed(&path_str) {
                    FileOutcome::Skipped
                } else {
                    match hash_file(&file.path) {
                        Ok(hash) => self.dispose(&file, &path_str, hash, target_dir, state),
                        Err(e) => {
                            error!("Failed to hash {}: {}", file.path.display(), e);
                            FileOutcome::HashFailed
                        }
                    }
                };
                self.finish(ledger, &file, &path_str, outcome, state, reporter);
            }
        }
    }

    fn run_parallel(
        &self,
        roots: &[PathBuf],
        ledgers: &[Arc<ProgressLedger>],
        walker: &FileWalker,
        target_dir: Option<&Path>,
        state: &mut RunState,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), Error> {
        let mut pool = HashPool::start(self.options.workers, DEFAULT_QUEUE_CAPACITY)?;
        let (tasks, results) = match (pool.take_sender(), pool.take_results()) {
            (Some(tasks), Some(results)) => (tasks, results),
            _ => return Err(Error::Other("hash pool channels unavailable".to_string())),
        };

        let resume = self.options.resume;
        let interrupt = self.interrupt.clone();

        thread::scope(|scope| {
            scope.spawn(move || {
                let mut seq = 0u64;
                'roots: for (root_idx, (root, ledger)) in roots.iter().zip(ledgers).enumerate() {
                    for file in walker.walk(root) {
                        if interrupt.is_cancelled() {
                            break 'roots;
                        }
                        let skip = resume && ledger.is_processed(&file.path.to_string_lossy());
                        let task = HashTask {
                            seq,
                            root: root_idx,
                            path: file.path,
                            size: file.size,
                            skip,
                        };
                        if tasks.send(task).is_err() {
                            break 'roots;
                        }
                        seq += 1;
                    }
                }
                debug!("Walk feeder finished after {} files", seq);
            });

            let mut current_root = None;
            for result in Reorder::new(results.iter()) {
                if self.interrupt.is_cancelled() {
                    state.stats.interrupted = true;
                    break;
                }
                let ledger = &ledgers[result.root];
                if current_root != Some(result.root) {
                    current_root = Some(result.root);
                    reporter.on_root_start(&roots[result.root].to_string_lossy(), ledger.processed_count());
                }

                let file = WalkedFile {
                    path: result.path,
                    size: result.size,
                };
                let path_str = file.path.to_string_lossy().into_owned();
                let outcome = match result.outcome {
                    HashOutcome::Skipped => FileOutcome::Skipped,
                    HashOutcome::Hashed(hash) => self.dispose(&file, &path_str, hash, target_dir, state),
                    HashOutcome::Failed(e) => {
                        error!("Failed to hash {}: {}", file.path.display(), e);
                        FileOutcome::HashFailed
                    }
                };
                self.finish(ledger, &file, &path_str, outcome, state, reporter);
            }
            // Unblocks workers (and through them the feeder) after an early stop.
            drop(results);
        });

        pool.join()?;
        Ok(())
    }

    fn finish(
        &self,
        ledger: &ProgressLedger,
        file: &WalkedFile,
        path_str: &str,
        outcome: FileOutcome,
        state: &mut RunState,
        reporter: &dyn ProgressReporter,
    ) {
        if outcome.marks_ledger() {
            if let Err(e) = ledger.mark_processed(path_str) {
                error!("Failed to record {} as processed: {}", path_str, e);
            }
        }
        state.stats.record(&outcome);
        self.log_outcome(file, &outcome, state);
        reporter.on_file_done(state.stats.total_processed, state.total_files, path_str);
    }

    fn dispose(
        &self,
        file: &WalkedFile,
        path_str: &str,
        hash: u64,
        target_dir: Option<&Path>,
        state: &mut RunState,
    ) -> FileOutcome {
        let hash = hex_digest(hash);
        debug!("File hash: {} = {}", path_str, hash);

        let indexed = match self.index.exists(&hash) {
            Ok(present) => present,
            Err(e) => {
                error!("Index lookup failed for {}: {}", path_str, e);
                return FileOutcome::LookupFailed;
            }
        };

        if indexed || state.would_add.contains_key(&hash) {
            debug!("File is duplicate (hash exists): {}", path_str);
            self.handle_duplicate(file, path_str, &hash, target_dir, state)
        } else {
            debug!("File is new (hash not indexed): {}", path_str);
            self.add_record(file, path_str, hash, state)
        }
    }

    fn handle_duplicate(
        &self,
        file: &WalkedFile,
        path_str: &str,
        hash: &str,
        target_dir: Option<&Path>,
        state: &RunState,
    ) -> FileOutcome {
        let record = match state.would_add.get(hash) {
            Some(pending) => Some(pending.clone()),
            None => match self.index.get(hash) {
                Ok(record) => record,
                Err(e) => {
                    error!("Failed to load record for {}: {}", hash, e);
                    return FileOutcome::LookupFailed;
                }
            },
        };

        if let Some(record) = &record {
            if record.path == path_str {
                return FileOutcome::AlreadyIndexed;
            }
            match self.options.identity.confirms(record, &file.path, file.size) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        "{} shares hash {} with {} but differs in content, leaving it alone",
                        path_str, hash, record.path
                    );
                    return FileOutcome::Collision;
                }
                Err(e) => {
                    warn!("Could not compare {} with {}: {}", path_str, record.path, e);
                    return FileOutcome::Collision;
                }
            }
        }

        match self.options.mode {
            DispositionMode::Delete => delete_duplicate(&file.path, file.size, self.options.dry_run),
            DispositionMode::Move => match target_dir {
                Some(target) => move_duplicate(&file.path, hash, target, self.options.dry_run),
                None => {
                    error!("No target directory for {}", path_str);
                    FileOutcome::DispositionFailed
                }
            },
        }
    }

    fn add_record(
        &self,
        file: &WalkedFile,
        path_str: &str,
        hash: String,
        state: &mut RunState,
    ) -> FileOutcome {
        let record = FileRecord::new(hash, path_str, file.size);

        if self.options.dry_run {
            state.would_add.insert(record.hash.clone(), record);
            return FileOutcome::Added;
        }

        match self.index.insert(&record) {
            Ok(()) => FileOutcome::Added,
            Err(StorageError::AlreadyExists(hash)) => {
                warn!(
                    "Hash {} was claimed concurrently, leaving {} untouched",
                    hash, path_str
                );
                FileOutcome::InsertFailed
            }
            Err(e) => {
                error!("Failed to insert record for {}: {}", path_str, e);
                FileOutcome::InsertFailed
            }
        }
    }

    fn log_outcome(&self, file: &WalkedFile, outcome: &FileOutcome, state: &RunState) {
        let n = state.stats.total_processed;
        let total = state.total_files;
        let path = file.path.display();
        let prefix = if self.options.dry_run { "[dry-run] " } else { "" };

        match outcome {
            FileOutcome::Skipped => {
                if self.options.verbose {
                    debug!("[{}/{}] Skipped already processed file: {}", n, total, path);
                }
            }
            FileOutcome::Added => info!("{}[{}/{}] New record: {} ({} bytes)", prefix, n, total, path, file.size),
            FileOutcome::Deleted { freed } => {
                info!("{}[{}/{}] Duplicate: {} ({} bytes, deleted)", prefix, n, total, path, freed)
            }
            FileOutcome::Moved { dest } => info!(
                "{}[{}/{}] Duplicate: {} ({} bytes, moved to {})",
                prefix,
                n,
                total,
                path,
                file.size,
                dest.display()
            ),
            FileOutcome::AlreadyIndexed => {
                debug!("[{}/{}] Already indexed as original: {}", n, total, path)
            }
            _ => {}
        }
    }
}

fn delete_duplicate(path: &Path, size: u64, dry_run: bool) -> FileOutcome {
    if dry_run {
        return FileOutcome::Deleted { freed: size };
    }
    match fs::remove_file(path) {
        Ok(()) => FileOutcome::Deleted { freed: size },
        Err(e) => {
            error!("Failed to delete {}: {}", path.display(), e);
            FileOutcome::DispositionFailed
        }
    }
}

fn move_duplicate(path: &Path, hash: &str, target_dir: &Path, dry_run: bool) -> FileOutcome {
    if !dry_run {
        if let Err(e) = fs::create_dir_all(target_dir) {
            error!("Failed to create target directory {}: {}", target_dir.display(), e);
            return FileOutcome::DispositionFailed;
        }
    }

    let name = placement::hash_file_name(hash, path);
    let dest = match placement::place(&name, target_dir) {
        Ok(dest) => dest,
        Err(e) => {
            error!("Failed to place {}: {}", path.display(), e);
            return FileOutcome::DispositionFailed;
        }
    };

    if dry_run {
        return FileOutcome::Moved { dest };
    }
    debug!("Moving {} -> {}", path.display(), dest.display());
    match placement::move_file(path, &dest) {
        Ok(()) => FileOutcome::Moved { dest },
        Err(e) => {
            error!("Failed to move {}: {}", path.display(), e);
            FileOutcome::DispositionFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use std::fs;
    use tempfile::tempdir;

    fn engine(options: DedupOptions) -> DedupEngine {
        let index = Arc::new(ExistenceIndex::open_in_memory().unwrap());
        DedupEngine::new(index, options).unwrap()
    }

    #[test]
    fn test_move_without_target_is_rejected() {
        let index = Arc::new(ExistenceIndex::open_in_memory().unwrap());
        let options = DedupOptions {
            mode: DispositionMode::Move,
            ..DedupOptions::default()
        };
        assert!(matches!(
            DedupEngine::new(index, options),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let tmp = tempdir().unwrap();
        let engine = engine(DedupOptions::default());
        let result = engine.process(&[tmp.path().join("absent")], &SilentReporter);
        assert!(result.is_err());
    }

    #[test]
    fn test_rescan_leaves_originals_alone() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), "x").unwrap();

        let engine = engine(DedupOptions::default());
        let first = engine.process(&[root.clone()], &SilentReporter).unwrap();
        assert_eq!(first.added, 1);

        let second = engine.process(&[root.clone()], &SilentReporter).unwrap();
        assert_eq!(second.already_indexed, 1);
        assert_eq!(second.deleted, 0);
        assert!(root.join("a.txt").exists());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), "same").unwrap();
        fs::write(root.join("b.txt"), "same").unwrap();

        let index = Arc::new(ExistenceIndex::open_in_memory().unwrap());
        let options = DedupOptions {
            dry_run: true,
            ..DedupOptions::default()
        };
        let engine = DedupEngine::new(Arc::clone(&index), options).unwrap();
        let stats = engine.process(&[root.clone()], &SilentReporter).unwrap();

        assert_eq!(stats.added, 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.freed_space, 4);
        assert!(root.join("a.txt").exists());
        assert!(root.join("b.txt").exists());
        assert_eq!(index.count().unwrap(), 0);
        assert!(!ledger::ledger_exists(&root.canonicalize().unwrap(), None));
    }

    #[test]
    fn test_stats_record_folds_outcomes() {
        let mut stats = ProcessStats::started();
        stats.record(&FileOutcome::Added);
        stats.record(&FileOutcome::Deleted { freed: 10 });
        stats.record(&FileOutcome::Moved {
            dest: PathBuf::from("/t/x"),
        });
        stats.record(&FileOutcome::HashFailed);
        stats.record(&FileOutcome::Skipped);
        assert_eq!(stats.total_processed, 5);
        assert_eq!(stats.duplicates(), 2);
        assert_eq!(stats.freed_space, 10);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_disposition_mode_parse() {
        assert_eq!("MOVE".parse::<DispositionMode>().unwrap(), DispositionMode::Move);
        assert!("shred".parse::<DispositionMode>().is_err());
    }
}
