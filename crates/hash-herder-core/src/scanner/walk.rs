use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use walkdir::{DirEntry, WalkDir};

use crate::ledger::LEDGER_FILE_PREFIX;

#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    pub ignore_patterns: Vec<String>,
    /// Directories never descended into, e.g. the move target.
    pub exclude_dirs: Vec<PathBuf>,
    pub skip_empty: bool,
}

/// A regular file found by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Depth-first, file-name ordered traversal yielding regular files.
/// Symlinks are not followed and unreadable entries are logged and skipped.
pub struct FileWalker {
    ignore_patterns: Vec<Pattern>,
    exclude_dirs: Vec<PathBuf>,
    skip_empty: bool,
}

impl FileWalker {
    pub fn new(options: &WalkOptions) -> Self {
        let ignore_patterns = options
            .ignore_patterns
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();

        Self {
            ignore_patterns,
            exclude_dirs: options.exclude_dirs.clone(),
            skip_empty: options.skip_empty,
        }
    }

    /// Excluded directories that contain `root` itself are ignored for this
    /// walk, so a move target above the scan root never hides the root.
    pub fn walk<'a>(&'a self, root: &Path) -> impl Iterator<Item = WalkedFile> + 'a {
        let excludes: Vec<&'a Path> = self
            .exclude_dirs
            .iter()
            .filter(|dir| {
                let contains_root = root.starts_with(dir);
                if contains_root {
                    debug!(
                        "{} contains scan root {}, not excluding it",
                        dir.display(),
                        root.display()
                    );
                }
                !contains_root
            })
            .map(PathBuf::as_path)
            .collect();

        WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !self.is_pruned(entry, &excludes))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(move |entry| {
                let size = match entry.metadata() {
                    Ok(metadata) => metadata.len(),
                    Err(err) => {
                        warn!("Error reading metadata for {}: {}", entry.path().display(), err);
                        return None;
                    }
                };
                if size == 0 && self.skip_empty {
                    debug!("Skipping empty file {}", entry.path().display());
                    return None;
                }
                Some(WalkedFile {
                    path: entry.into_path(),
                    size,
                })
            })
    }

    pub fn count_files(&self, roots: &[PathBuf]) -> usize {
        roots.iter().map(|root| self.walk(root).count()).sum()
    }

    fn is_pruned(&self, entry: &DirEntry, excludes: &[&Path]) -> bool {
        let path = entry.path();
        if entry.file_type().is_dir() && excludes.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }
        if entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(LEDGER_FILE_PREFIX))
        {
            return true;
        }
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn names(files: &[WalkedFile], root: &Path) -> Vec<String> {
        files
            .iter()
            .map(|f| {
                f.path
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_walk_is_sorted_and_files_only() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("b/inner")).unwrap();
        fs::write(root.join("c.txt"), "c").unwrap();
        fs::write(root.join("a.txt"), "aa").unwrap();
        fs::write(root.join("b/inner/z.txt"), "z").unwrap();

        let walker = FileWalker::new(&WalkOptions::default());
        let files: Vec<_> = walker.walk(root).collect();
        assert_eq!(names(&files, root), vec!["a.txt", "b/inner/z.txt", "c.txt"]);
        assert_eq!(files[0].size, 2);
    }

    #[test]
    fn test_excludes_and_ignores() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("target")).unwrap();
        fs::create_dir_all(root.join("cache")).unwrap();
        fs::write(root.join("target/moved.txt"), "m").unwrap();
        fs::write(root.join("cache/tmp.bin"), "t").unwrap();
        fs::write(root.join("keep.txt"), "k").unwrap();
        fs::write(root.join("empty.txt"), "").unwrap();
        fs::write(root.join(format!("{LEDGER_FILE_PREFIX}abc.txt")), "/x\n").unwrap();

        let options = WalkOptions {
            ignore_patterns: vec!["*/cache".to_string()],
            exclude_dirs: vec![root.join("target")],
            skip_empty: true,
        };
        let walker = FileWalker::new(&options);
        let files: Vec<_> = walker.walk(root).collect();
        assert_eq!(names(&files, root), vec!["keep.txt"]);
        assert_eq!(walker.count_files(&[root.to_path_buf()]), 1);
    }

    #[test]
    fn test_exclude_above_root_still_walks_root() {
        let tmp = tempdir().unwrap();
        let data = tmp.path().join("data");
        let root = data.join("photos");
        fs::create_dir_all(root.join("trip")).unwrap();
        fs::write(root.join("a.jpg"), "a").unwrap();
        fs::write(root.join("trip/b.jpg"), "b").unwrap();

        let options = WalkOptions {
            exclude_dirs: vec![data.clone(), root.join("trip")],
            ..Default::default()
        };
        let walker = FileWalker::new(&options);
        let files: Vec<_> = walker.walk(&root).collect();
        assert_eq!(names(&files, &root), vec!["a.jpg"]);

        let exact = WalkOptions {
            exclude_dirs: vec![root.clone()],
            ..Default::default()
        };
        assert_eq!(FileWalker::new(&exact).count_files(&[root]), 2);
    }
}
