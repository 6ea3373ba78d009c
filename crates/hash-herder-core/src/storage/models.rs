/// The first-seen file for a given content hash.
///
/// Rows are written once and never updated; a second insert for the same
/// hash is rejected by the unique index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub hash: String,
    pub path: String,
    pub size: u64,
    /// Unix seconds.
    pub created_at: i64,
}

impl FileRecord {
    pub fn new(hash: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            hash: hash.into(),
            path: path.into(),
            size,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Persisted running file count for one category under one destination root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub dest_root: String,
    pub category: String,
    pub file_count: u64,
}
