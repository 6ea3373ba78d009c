use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

pub const SHARD_PREFIX: &str = "part_";

pub fn shard_dir_name(index: u64) -> String {
    format!("{SHARD_PREFIX}{index:04}")
}

pub fn parse_shard_index(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(SHARD_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Shard index for the next file of a category that already holds `count`.
pub fn shard_index(count: u64, capacity: u64) -> u64 {
    count / capacity.max(1)
}

/// Estimate how many files a category directory already holds.
///
/// Every shard below the highest-numbered one is taken to hold at least
/// `capacity` files (missing shards included), so numbering never moves
/// backwards. A shard thinned by hand is therefore over-counted.
pub fn count_from_disk(category_dir: &Path, capacity: u64) -> io::Result<u64> {
    let entries = match fs::read_dir(category_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut shards: Vec<(u64, std::path::PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(index) = entry.file_name().to_str().and_then(parse_shard_index) {
            shards.push((index, entry.path()));
        }
    }

    let Some(highest) = shards.iter().map(|(index, _)| *index).max() else {
        return Ok(0);
    };

    let actual: u64 = shards
        .par_iter()
        .map(|(index, path)| {
            let files = count_files(path);
            debug!("Shard {} of {} holds {} files", index, category_dir.display(), files);
            if *index == highest {
                files
            } else {
                files.max(capacity)
            }
        })
        .sum();

    let missing = (highest + 1).saturating_sub(shards.len() as u64);
    Ok(actual + missing * capacity)
}

fn count_files(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count() as u64
}
