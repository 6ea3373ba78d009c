use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info, warn};

use crate::hasher::xxhash::{hash_data, hex_digest};

pub const LEDGER_FILE_PREFIX: &str = ".hash-herder-progress-";

/// Buffered appends are pushed to disk after this many new entries.
const FLUSH_EVERY: usize = 100;

struct LedgerState {
    writer: Option<BufWriter<File>>,
    seen: HashSet<String>,
    unflushed: usize,
}

/// Append-only record of the paths already handled under one scan root.
///
/// The file's presence on disk means the last scan of that root did not
/// finish; `close` deletes it once a walk completes cleanly.
pub struct ProgressLedger {
    root: PathBuf,
    file_path: PathBuf,
    state: RwLock<LedgerState>,
}

/// Where the ledger for `root` lives. Defaults to the root's parent so the
/// walk never visits its own ledger.
pub fn ledger_path(root: &Path, ledger_dir: Option<&Path>) -> PathBuf {
    let dir = match ledger_dir {
        Some(dir) => dir.to_path_buf(),
        None => root.parent().unwrap_or(root).to_path_buf(),
    };
    let tag = hex_digest(hash_data(root.to_string_lossy().as_bytes()));
    dir.join(format!("{LEDGER_FILE_PREFIX}{tag}.txt"))
}

pub fn ledger_exists(root: &Path, ledger_dir: Option<&Path>) -> bool {
    ledger_path(root, ledger_dir).exists()
}

/// Delete a leftover ledger before a reset scan. Returns whether one existed.
pub fn remove_stale(root: &Path, ledger_dir: Option<&Path>) -> io::Result<bool> {
    let path = ledger_path(root, ledger_dir);
    match fs::remove_file(&path) {
        Ok(()) => {
            info!("Removed stale progress ledger {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl ProgressLedger {
    /// Open (or reopen) the ledger for `root`, loading every prior entry.
    ///
    /// Never fails: an unreadable ledger degrades to an empty one, and a
    /// ledger that cannot be written degrades to memory-only tracking. With
    /// `read_only` nothing is ever written or deleted.
    pub fn open(root: &Path, ledger_dir: Option<&Path>, read_only: bool) -> Self {
        let file_path = ledger_path(root, ledger_dir);

        let (seen, loaded_cleanly) = match load_entries(&file_path) {
            Ok(seen) => {
                if !seen.is_empty() {
                    info!(
                        "Loaded {} processed paths from {}",
                        seen.len(),
                        file_path.display()
                    );
                }
                (seen, true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => (HashSet::new(), true),
            Err(e) => {
                warn!(
                    "Could not load progress ledger {}, starting fresh: {}",
                    file_path.display(),
                    e
                );
                (HashSet::new(), false)
            }
        };

        let writer = if read_only {
            None
        } else {
            match open_for_append(&file_path, !loaded_cleanly) {
                Ok(file) => Some(BufWriter::new(file)),
                Err(e) => {
                    warn!(
                        "Could not open progress ledger {} for writing, progress will not survive a restart: {}",
                        file_path.display(),
                        e
                    );
                    None
                }
            }
        };

        Self {
            root: root.to_path_buf(),
            file_path,
            state: RwLock::new(LedgerState {
                writer,
                seen,
                unflushed: 0,
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn is_processed(&self, path: &str) -> bool {
        match self.state.read() {
            Ok(state) => state.seen.contains(path),
            Err(poisoned) => poisoned.into_inner().seen.contains(path),
        }
    }

    /// Record `path` as handled. Marking an already-marked path is a no-op.
    pub fn mark_processed(&self, path: &str) -> io::Result<()> {
        let mut state = self.lock_state();
        if state.seen.contains(path) {
            return Ok(());
        }

        // A newline in the path would split it into two bogus entries.
        if !path.contains('\n') {
            if let Some(writer) = state.writer.as_mut() {
                writer.write_all(path.as_bytes())?;
                writer.write_all(b"\n")?;
            }
        } else {
            debug!("Tracking {:?} in memory only", path);
        }

        state.seen.insert(path.to_string());
        state.unflushed += 1;
        if state.unflushed >= FLUSH_EVERY {
            state.unflushed = 0;
            if let Some(writer) = state.writer.as_mut() {
                if let Err(e) = writer.flush() {
                    warn!("Failed to flush {}: {}", self.file_path.display(), e);
                }
            }
        }
        Ok(())
    }

    /// Push every completed `mark_processed` to disk.
    pub fn flush(&self) -> io::Result<()> {
        let mut state = self.lock_state();
        state.unflushed = 0;
        match state.writer.as_mut() {
            Some(writer) => {
                writer.flush()?;
                writer.get_ref().sync_data()
            }
            None => Ok(()),
        }
    }

    /// Flush, then delete the ledger: this root finished cleanly.
    pub fn close(&self) -> io::Result<()> {
        let mut state = self.lock_state();
        let Some(mut writer) = state.writer.take() else {
            return Ok(());
        };
        writer.flush()?;
        drop(writer);

        match fs::remove_file(&self.file_path) {
            Ok(()) => {
                info!("Scan of {} complete, removed {}", self.root.display(), self.file_path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn processed_count(&self) -> usize {
        match self.state.read() {
            Ok(state) => state.seen.len(),
            Err(poisoned) => poisoned.into_inner().seen.len(),
        }
    }

    fn lock_state(&self) -> std::sync::RwLockWriteGuard<'_, LedgerState> {
        // A panic mid-append cannot leave the set inconsistent with itself.
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn load_entries(path: &Path) -> io::Result<HashSet<String>> {
    let data = fs::read_to_string(path)?;
    Ok(data
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn open_for_append(path: &Path, truncate: bool) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    options.open(path)
}
