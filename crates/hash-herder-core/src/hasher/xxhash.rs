use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, Read};
use std::path::Path;
use tracing::trace;
use twox_hash::XxHash64;

const READ_BUFFER_LENGTH: usize = 64 * 1024; // 64KB

/// Stream a file's full content through XxHash64 and return the digest.
///
/// Only a fixed-size buffer is held in memory, so arbitrarily large files
/// hash in constant space.
pub fn hash_file(file: &Path) -> io::Result<u64> {
    let mut f = File::open(file)?;
    let mut hasher = XxHash64::with_seed(0);
    let mut buffer = vec![0u8; READ_BUFFER_LENGTH];

    loop {
        let bytes_read = match f.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.write(&buffer[..bytes_read]);
    }

    let hash = hasher.finish();
    trace!("Hashed {} -> {:016x}", file.display(), hash);
    Ok(hash)
}

pub fn hash_data(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}

/// Fixed-width lowercase hex rendering used as the index key.
pub fn hex_digest(hash: u64) -> String {
    format!("{:016x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_hash_file_is_deterministic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, b"deterministic content").unwrap();

        let first = hash_file(&path).unwrap();
        let second = hash_file(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_hash_file_matches_in_memory_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        // Spans several read buffers
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        assert_eq!(hash_file(&path).unwrap(), hash_data(&data));
    }

    #[test]
    fn test_different_content_different_hash() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "x").unwrap();
        fs::write(&b, "y").unwrap();
        assert_ne!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(hash_file(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_hex_digest_is_fixed_width() {
        assert_eq!(hex_digest(0), "0000000000000000");
        assert_eq!(hex_digest(0xabc), "0000000000000abc");
        assert_eq!(hex_digest(u64::MAX).len(), 16);
    }
}
