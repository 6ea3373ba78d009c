use super::models::*;
use super::sqlite::Database;
use super::{Result, StorageError};
use rusqlite::{params, ErrorCode, OptionalExtension};
use tracing::debug;

impl Database {
    // ── File Records ─────────────────────────────────────────────

    /// Insert a record inside its own transaction. A duplicate hash is
    /// reported as `StorageError::AlreadyExists` and leaves the existing row
    /// untouched.
    pub fn insert_file_record(&mut self, record: &FileRecord) -> Result<()> {
        let tx = self.connection_mut().transaction()?;
        let inserted = tx.execute(
            "INSERT INTO file_record (hash, path, size, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.hash,
                record.path,
                record.size as i64,
                record.created_at
            ],
        );

        match inserted {
            Ok(_) => {
                tx.commit()?;
                debug!("Inserted record {} for {}", record.hash, record.path);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                // Dropping the transaction rolls it back.
                Err(StorageError::AlreadyExists(record.hash.clone()))
            }
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    pub fn hash_exists(&self, hash: &str) -> Result<bool> {
        let found: Option<i64> = self
            .connection()
            .query_row(
                "SELECT 1 FROM file_record WHERE hash = ?1 LIMIT 1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn find_by_hash(&self, hash: &str) -> Result<Option<FileRecord>> {
        let record = self
            .connection()
            .query_row(
                "SELECT hash, path, size, created_at FROM file_record WHERE hash = ?1",
                params![hash],
                |row| {
                    Ok(FileRecord {
                        hash: row.get(0)?,
                        path: row.get(1)?,
                        size: row.get::<_, i64>(2)? as u64,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn count_file_records(&self) -> Result<u64> {
        let count: i64 =
            self.connection()
                .query_row("SELECT COUNT(*) FROM file_record", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ── Category Counts ──────────────────────────────────────────

    pub fn get_category_count(&self, dest_root: &str, category: &str) -> Result<Option<u64>> {
        let count: Option<i64> = self
            .connection()
            .query_row(
                "SELECT file_count FROM category_count WHERE dest_root = ?1 AND category = ?2",
                params![dest_root, category],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.map(|c| c as u64))
    }

    pub fn set_category_count(&self, dest_root: &str, category: &str, file_count: u64) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "INSERT INTO category_count (dest_root, category, file_count, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(dest_root, category) DO UPDATE SET \
             file_count = excluded.file_count, updated_at = excluded.updated_at",
            params![dest_root, category, file_count as i64, now],
        )?;
        Ok(())
    }

    pub fn get_category_counts(&self, dest_root: &str) -> Result<Vec<CategoryCount>> {
        let mut stmt = self.connection().prepare(
            "SELECT dest_root, category, file_count FROM category_count \
             WHERE dest_root = ?1 ORDER BY category",
        )?;
        let rows = stmt
            .query_map(params![dest_root], |row| {
                Ok(CategoryCount {
                    dest_root: row.get(0)?,
                    category: row.get(1)?,
                    file_count: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
