use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::storage::models::FileRecord;

/// How much evidence beyond a matching hash is needed before a file is
/// treated as a copy of the indexed original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum IdentityPolicy {
    /// Equal digests are equal content.
    #[default]
    #[serde(rename = "hash", alias = "hash-only")]
    HashOnly,
    /// Digests and sizes must both match.
    #[serde(rename = "hash-size")]
    HashAndSize,
    /// Byte-for-byte comparison against the original when it still exists,
    /// size comparison otherwise.
    #[serde(rename = "full")]
    FullCompare,
}

impl IdentityPolicy {
    pub fn confirms(&self, record: &FileRecord, candidate: &Path, size: u64) -> io::Result<bool> {
        match self {
            IdentityPolicy::HashOnly => Ok(true),
            IdentityPolicy::HashAndSize => Ok(record.size == size),
            IdentityPolicy::FullCompare => {
                if record.size != size {
                    return Ok(false);
                }
                let original = Path::new(&record.path);
                if !original.is_file() {
                    debug!(
                        "Original {} is gone, falling back to size comparison",
                        record.path
                    );
                    return Ok(true);
                }
                same_content(original, candidate)
            }
        }
    }
}

impl fmt::Display for IdentityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentityPolicy::HashOnly => "hash",
            IdentityPolicy::HashAndSize => "hash-size",
            IdentityPolicy::FullCompare => "full",
        };
        f.write_str(name)
    }
}

impl FromStr for IdentityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hash" | "hash-only" => Ok(IdentityPolicy::HashOnly),
            "hash-size" => Ok(IdentityPolicy::HashAndSize),
            "full" => Ok(IdentityPolicy::FullCompare),
            other => Err(format!(
                "unknown identity policy '{other}' (expected hash, hash-size or full)"
            )),
        }
    }
}

fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    let mut ra = BufReader::new(File::open(a)?);
    let mut rb = BufReader::new(File::open(b)?);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];

    loop {
        let n = read_full(&mut ra, &mut buf_a)?;
        let m = read_full(&mut rb, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the reader allows; short only at end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
