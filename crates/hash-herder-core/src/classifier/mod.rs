pub mod category;
pub mod shard;

pub use category::{Category, Detection};

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::{self, AppConfig};
use crate::error::Error;
use crate::interrupt::InterruptHandle;
use crate::placement;
use crate::progress::ProgressReporter;
use crate::scanner::{self, FileWalker, WalkOptions, WalkedFile};
use crate::storage::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    #[default]
    Move,
    Copy,
}

#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    pub files_per_dir: usize,
    pub transfer: TransferMode,
    pub walk: WalkOptions,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            files_per_dir: config::DEFAULT_FILES_PER_DIR,
            transfer: TransferMode::Move,
            walk: WalkOptions::default(),
        }
    }
}

impl ClassifyOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            files_per_dir: config.classify.files_per_dir,
            walk: WalkOptions {
                ignore_patterns: config.scanner.ignore_patterns.clone(),
                exclude_dirs: Vec::new(),
                skip_empty: config.scanner.skip_empty,
            },
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassifierStats {
    pub total_processed: u64,
    pub processed: u64,
    pub failed: u64,
    pub unknown_type: u64,
    /// Files placed this run, per category.
    pub per_category: BTreeMap<String, u64>,
    pub interrupted: bool,
}

impl ClassifierStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        self.processed as f64 / self.total_processed as f64 * 100.0
    }
}

/// Sorts files into `<dest>/<category>/part_NNNN/`, at most
/// `files_per_dir` per shard (collision renames excepted).
pub struct Classifier {
    options: ClassifyOptions,
    counts: HashMap<Category, u64>,
    count_store: Option<Database>,
    interrupt: InterruptHandle,
}

impl Classifier {
    pub fn new(options: ClassifyOptions) -> Result<Self, Error> {
        if options.files_per_dir == 0 {
            return Err(Error::InvalidConfig(
                "files per directory must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            options,
            counts: HashMap::new(),
            count_store: None,
            interrupt: InterruptHandle::new(),
        })
    }

    /// Persist per-category counts, replacing the on-disk estimate for every
    /// category the store already knows.
    pub fn with_count_store(mut self, db: Database) -> Self {
        self.count_store = Some(db);
        self
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn classify(
        &mut self,
        sources: &[PathBuf],
        dest: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<ClassifierStats, Error> {
        info!("Classifying {} source directories", sources.len());
        fs::create_dir_all(dest).map_err(|e| Error::path_io("create destination", dest, e))?;
        let dest_root =
            scanner::resolve_path(dest).map_err(|e| Error::path_io("resolve destination", dest, e))?;
        info!("Destination: {}", dest_root.display());

        let mut roots = Vec::with_capacity(sources.len());
        for source in sources {
            let root = scanner::resolve_path(source)
                .map_err(|e| Error::path_io("resolve source", source, e))?;
            if !root.is_dir() {
                return Err(Error::InvalidConfig(format!(
                    "source {} is not a directory",
                    source.display()
                )));
            }
            roots.push(root);
        }
        let roots = config::non_overlapping_directories(roots);

        let mut walk_options = self.options.walk.clone();
        walk_options.exclude_dirs.push(dest_root.clone());
        let walker = FileWalker::new(&walk_options);

        reporter.on_count_start();
        let total_files = walker.count_files(&roots);
        reporter.on_count_complete(total_files);

        // Counts are seeded fresh each run; the destination may have changed.
        self.counts.clear();
        let start = std::time::Instant::now();
        let mut stats = ClassifierStats::default();

        'roots: for root in &roots {
            info!("Processing directory: {}", root.display());
            reporter.on_root_start(&root.to_string_lossy(), 0);
            for file in walker.walk(root) {
                if self.interrupt.is_cancelled() {
                    stats.interrupted = true;
                    break 'roots;
                }
                stats.total_processed += 1;

                match self.process_file(&file, &dest_root, &mut stats) {
                    Ok((category, target)) => {
                        stats.processed += 1;
                        *stats.per_category.entry(category.to_string()).or_default() += 1;
                        debug!("{} -> {} ({})", file.path.display(), target.display(), category);
                    }
                    Err(e) => {
                        stats.failed += 1;
                        error!("Failed to classify {}: {}", file.path.display(), e);
                    }
                }
                reporter.on_file_done(stats.total_processed, total_files, &file.path.to_string_lossy());
            }
        }

        if stats.interrupted {
            reporter.on_interrupted(stats.total_processed);
            warn!("Interrupted after {}/{} files", stats.total_processed, total_files);
        }
        self.interrupt.clear();
        reporter.on_run_complete(stats.total_processed, start.elapsed().as_secs_f64());
        info!(
            "Classification finished: total={}, placed={}, failed={}, unknown={}",
            stats.total_processed, stats.processed, stats.failed, stats.unknown_type
        );
        Ok(stats)
    }

    fn process_file(
        &mut self,
        file: &WalkedFile,
        dest_root: &Path,
        stats: &mut ClassifierStats,
    ) -> Result<(Category, PathBuf), Error> {
        let detection = category::detect(&file.path)
            .map_err(|e| Error::path_io("detect file type", &file.path, e))?;
        if !detection.recognized {
            debug!("Unknown file type: {}", file.path.display());
            stats.unknown_type += 1;
        }
        let category = detection.category;

        let count = self.current_count(category, dest_root)?;
        let capacity = self.options.files_per_dir as u64;
        let shard_dir = dest_root
            .join(category.as_str())
            .join(shard::shard_dir_name(shard::shard_index(count, capacity)));
        fs::create_dir_all(&shard_dir)
            .map_err(|e| Error::path_io("create shard directory", &shard_dir, e))?;

        let file_name = file
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Other(format!("{} has no file name", file.path.display())))?;
        let target = placement::place(&file_name, &shard_dir)?;

        match self.options.transfer {
            TransferMode::Move => placement::move_file(&file.path, &target)
                .map_err(|e| Error::path_io("move file", &file.path, e))?,
            TransferMode::Copy => {
                fs::copy(&file.path, &target).map_err(|e| Error::path_io("copy file", &file.path, e))?;
            }
        }

        let placed = count + 1;
        self.counts.insert(category, placed);
        self.persist_count(category, dest_root, placed);
        Ok((category, target))
    }

    /// Running count for a category, seeded on first use this run.
    fn current_count(&mut self, category: Category, dest_root: &Path) -> Result<u64, Error> {
        if let Some(&count) = self.counts.get(&category) {
            return Ok(count);
        }

        let stored = match &self.count_store {
            Some(db) => db.get_category_count(&dest_root.to_string_lossy(), category.as_str())?,
            None => None,
        };
        let count = match stored {
            Some(count) => {
                debug!("Seeded {} from stored count {}", category, count);
                count
            }
            None => {
                let category_dir = dest_root.join(category.as_str());
                let count = shard::count_from_disk(&category_dir, self.options.files_per_dir as u64)
                    .map_err(|e| Error::path_io("count shard files", &category_dir, e))?;
                debug!("Seeded {} from disk: {} files", category, count);
                count
            }
        };
        self.counts.insert(category, count);
        Ok(count)
    }

    fn persist_count(&self, category: Category, dest_root: &Path, count: u64) {
        if let Some(db) = &self.count_store {
            if let Err(e) =
                db.set_category_count(&dest_root.to_string_lossy(), category.as_str(), count)
            {
                warn!("Failed to persist count for {}: {}", category, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use tempfile::tempdir;

    #[test]
    fn test_zero_capacity_is_rejected() {
        let options = ClassifyOptions {
            files_per_dir: 0,
            ..ClassifyOptions::default()
        };
        assert!(matches!(Classifier::new(options), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_destination_inside_source_is_not_walked() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("notes.txt"), "plain words").unwrap();
        let dest = src.join("sorted");

        let mut classifier = Classifier::new(ClassifyOptions::default()).unwrap();
        let stats = classifier
            .classify(&[src.clone()], &dest, &SilentReporter)
            .unwrap();

        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.processed, 1);
        assert!(dest.join("other").join("part_0000").join("notes.txt").exists());
    }

    #[test]
    fn test_success_rate() {
        let stats = ClassifierStats {
            total_processed: 4,
            processed: 3,
            ..ClassifierStats::default()
        };
        assert_eq!(stats.success_rate(), 75.0);
        assert_eq!(ClassifierStats::default().success_rate(), 0.0);
    }
}
