use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Canonical name plus `_1` … `_99`.
pub const MAX_PLACEMENT_ATTEMPTS: usize = 100;

#[derive(Error, Debug)]
pub enum PlacementError {
    #[error("no free name for {name} in {dir} after {attempts} attempts")]
    Exhausted {
        name: String,
        dir: PathBuf,
        attempts: usize,
    },

    #[error("could not check {path}: {source}")]
    Probe {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Pick a destination for `file_name` inside `target_dir` that does not exist
/// yet: the name itself, then `stem_1.ext`, `stem_2.ext`, and so on.
///
/// This only probes the directory; a second process filling the same
/// directory at the same time can still race us.
pub fn place(file_name: &str, target_dir: &Path) -> Result<PathBuf, PlacementError> {
    let (stem, ext) = split_name(file_name);

    for attempt in 0..MAX_PLACEMENT_ATTEMPTS {
        let candidate = target_dir.join(candidate_name(stem, ext, attempt));
        match candidate.try_exists() {
            Ok(false) => {
                if attempt > 0 {
                    debug!("Placed {} as {}", file_name, candidate.display());
                }
                return Ok(candidate);
            }
            Ok(true) => {
                if attempt == 0 {
                    warn!(
                        "{} already exists, picking a suffixed name",
                        candidate.display()
                    );
                }
            }
            Err(source) => {
                return Err(PlacementError::Probe {
                    path: candidate,
                    source,
                })
            }
        }
    }

    Err(PlacementError::Exhausted {
        name: file_name.to_string(),
        dir: target_dir.to_path_buf(),
        attempts: MAX_PLACEMENT_ATTEMPTS,
    })
}

/// Name a duplicate after its content hash: `xxxxxxxx_yyyyyyyy.ext`.
pub fn hash_file_name(hash: &str, original: &Path) -> String {
    let split = hash.len().min(8);
    let mut name = format!("{}_{}", &hash[..split], &hash[split..]);
    if let Some(ext) = original.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    name
}

/// Rename `src` to `dest`, falling back to copy-then-remove when a plain
/// rename is refused (typically across filesystems).
pub fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    let rename_err = match fs::rename(src, dest) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    if !src.is_file() {
        return Err(rename_err);
    }

    debug!(
        "Rename {} -> {} failed ({}), copying instead",
        src.display(),
        dest.display(),
        rename_err
    );
    if fs::copy(src, dest).is_err() {
        let _ = fs::remove_file(dest);
        return Err(rename_err);
    }
    if let Err(e) = fs::remove_file(src) {
        let _ = fs::remove_file(dest);
        return Err(e);
    }
    Ok(())
}

fn split_name(file_name: &str) -> (&str, Option<&str>) {
    let path = Path::new(file_name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => match (stem.to_str(), ext.to_str()) {
            (Some(stem), Some(ext)) => (stem, Some(ext)),
            _ => (file_name, None),
        },
        _ => (file_name, None),
    }
}

fn candidate_name(stem: &str, ext: Option<&str>, attempt: usize) -> String {
    match (attempt, ext) {
        (0, Some(ext)) => format!("{stem}.{ext}"),
        (0, None) => stem.to_string(),
        (n, Some(ext)) => format!("{stem}_{n}.{ext}"),
        (n, None) => format!("{stem}_{n}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_free_name_is_used_as_is() {
        let dir = tempdir().unwrap();
        let dest = place("photo.jpg", dir.path()).unwrap();
        assert_eq!(dest, dir.path().join("photo.jpg"));
    }

    #[test]
    fn test_collisions_get_ordered_suffixes() {
        let dir = tempdir().unwrap();
        let mut placed = Vec::new();
        for _ in 0..4 {
            let dest = place("photo.jpg", dir.path()).unwrap();
            fs::write(&dest, "x").unwrap();
            placed.push(dest.file_name().unwrap().to_string_lossy().into_owned());
        }
        assert_eq!(
            placed,
            vec!["photo.jpg", "photo_1.jpg", "photo_2.jpg", "photo_3.jpg"]
        );
    }

    #[test]
    fn test_names_without_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("README"), "x").unwrap();
        fs::write(dir.path().join(".bashrc"), "x").unwrap();
        assert_eq!(place("README", dir.path()).unwrap(), dir.path().join("README_1"));
        assert_eq!(place(".bashrc", dir.path()).unwrap(), dir.path().join(".bashrc_1"));
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        for n in 1..MAX_PLACEMENT_ATTEMPTS {
            fs::write(dir.path().join(format!("a_{n}.txt")), "x").unwrap();
        }
        let err = place("a.txt", dir.path()).unwrap_err();
        assert!(matches!(err, PlacementError::Exhausted { attempts: 100, .. }));
    }

    #[test]
    fn test_move_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dest = dir.path().join("dest.bin");
        fs::write(&src, "payload").unwrap();

        move_file(&src, &dest).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "payload");
        assert!(move_file(&src, &dir.path().join("again.bin")).is_err());
    }

    #[test]
    fn test_hash_file_name() {
        let name = hash_file_name("0123456789abcdef", Path::new("/x/holiday.JPG"));
        assert_eq!(name, "01234567_89abcdef.JPG");
        let bare = hash_file_name("0123456789abcdef", Path::new("/x/Makefile"));
        assert_eq!(bare, "01234567_89abcdef");
    }
}
