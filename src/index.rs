//! Embedded metadata index (spec component C5).
//!
//! Backed by a single SQLite database shared across every pool the engine
//! manages, keyed by `(pool_id, rel_path, drive_root)`. Every operation opens
//! and closes its own connection rather than holding one open across calls —
//! simpler than pooling a connection, and index operations are infrequent
//! enough (one per replica per write/heal/rebalance) that the overhead is
//! not worth the complexity.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One drive's copy of one file, as last recorded by a write, heal, or
/// rebalance operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaRecord {
    pub pool_id: String,
    pub rel_path: String,
    pub drive_root: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub modified_utc: String,
}

pub struct MetadataIndex {
    db_path: PathBuf,
}

impl MetadataIndex {
    /// Open (creating if absent) the index at `db_path`, applying the schema.
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating index directory {}", parent.display()))?;
        }
        let index = MetadataIndex { db_path };
        index.with_connection(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS replicas (
                    pool_id      TEXT NOT NULL,
                    rel_path     TEXT NOT NULL,
                    drive_root   TEXT NOT NULL,
                    size_bytes   INTEGER NOT NULL,
                    sha256       TEXT NOT NULL,
                    modified_utc TEXT NOT NULL,
                    PRIMARY KEY (pool_id, rel_path, drive_root)
                );
                CREATE INDEX IF NOT EXISTS idx_replicas_pool_path
                    ON replicas (pool_id, rel_path);",
            )?;
            Ok(())
        })
    }

    fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("opening index at {}", self.db_path.display()))?;
        f(&conn)
    }

    /// Insert or update one replica's record (spec §4.8 step 6 / §4.9 heal /
    /// §4.10 rebalance).
    pub fn upsert(&self, record: &ReplicaRecord) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO replicas (pool_id, rel_path, drive_root, size_bytes, sha256, modified_utc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(pool_id, rel_path, drive_root) DO UPDATE SET
                     size_bytes = excluded.size_bytes,
                     sha256 = excluded.sha256,
                     modified_utc = excluded.modified_utc",
                params![
                    record.pool_id,
                    record.rel_path,
                    record.drive_root,
                    record.size_bytes as i64,
                    record.sha256,
                    record.modified_utc,
                ],
            )?;
            Ok(())
        })
    }

    /// Remove a single replica's record (one drive of one file in one pool).
    pub fn remove(&self, pool_id: &str, rel_path: &str, drive_root: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM replicas WHERE pool_id = ?1 AND rel_path = ?2 AND drive_root = ?3",
                params![pool_id, rel_path, drive_root],
            )?;
            Ok(())
        })
    }

    /// Remove every record for a file across all of its replicas (spec `delete`).
    pub fn remove_all(&self, pool_id: &str, rel_path: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM replicas WHERE pool_id = ?1 AND rel_path = ?2",
                params![pool_id, rel_path],
            )?;
            Ok(())
        })
    }

    /// Every replica recorded for one file in one pool.
    pub fn get_replicas(&self, pool_id: &str, rel_path: &str) -> Result<Vec<ReplicaRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT pool_id, rel_path, drive_root, size_bytes, sha256, modified_utc
                 FROM replicas WHERE pool_id = ?1 AND rel_path = ?2",
            )?;
            let rows = stmt.query_map(params![pool_id, rel_path], row_to_record)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Every replica recorded anywhere in a pool, used by the rebalancer to
    /// enumerate the set of relpaths it must reconcile.
    pub fn get_all_for_pool(&self, pool_id: &str) -> Result<Vec<ReplicaRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT pool_id, rel_path, drive_root, size_bytes, sha256, modified_utc
                 FROM replicas WHERE pool_id = ?1",
            )?;
            let rows = stmt.query_map(params![pool_id], row_to_record)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Whether any replica of `rel_path` is recorded in `pool_id` (backs the
    /// `exists` operation together with a filesystem fallback probe).
    pub fn has_any_replica(&self, pool_id: &str, rel_path: &str) -> Result<bool> {
        Ok(!self.get_replicas(pool_id, rel_path)?.is_empty())
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ReplicaRecord> {
    Ok(ReplicaRecord {
        pool_id: row.get(0)?,
        rel_path: row.get(1)?,
        drive_root: row.get(2)?,
        size_bytes: row.get::<_, i64>(3)? as u64,
        sha256: row.get(4)?,
        modified_utc: row.get(5)?,
    })
}

/// Default on-disk location for the index database (spec §A.3): the OS
/// app-data directory, under a dedicated subdirectory.
pub fn default_db_path(db_filename: &str) -> PathBuf {
    let base = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
    base.join("KydrasStorage").join(db_filename)
}

pub fn drive_root_key(root: &Path) -> String {
    root.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record(pool_id: &str, rel_path: &str, drive_root: &str) -> ReplicaRecord {
        ReplicaRecord {
            pool_id: pool_id.to_string(),
            rel_path: rel_path.to_string(),
            drive_root: drive_root.to_string(),
            size_bytes: 42,
            sha256: "ABCDEF".to_string(),
            modified_utc: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn upsert_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let index = MetadataIndex::open(dir.path().join("idx.db")).unwrap();
        let record = sample_record("pool-1", "a/b.txt", "/drive-a");
        index.upsert(&record).unwrap();

        let fetched = index.get_replicas("pool-1", "a/b.txt").unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].sha256, "ABCDEF");
    }

    #[test]
    fn upsert_on_existing_key_updates_fields() {
        let dir = tempdir().unwrap();
        let index = MetadataIndex::open(dir.path().join("idx.db")).unwrap();
        let mut record = sample_record("pool-1", "a/b.txt", "/drive-a");
        index.upsert(&record).unwrap();

        record.sha256 = "123456".to_string();
        record.size_bytes = 100;
        index.upsert(&record).unwrap();

        let fetched = index.get_replicas("pool-1", "a/b.txt").unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].sha256, "123456");
        assert_eq!(fetched[0].size_bytes, 100);
    }

    #[test]
    fn remove_all_clears_every_replica() {
        let dir = tempdir().unwrap();
        let index = MetadataIndex::open(dir.path().join("idx.db")).unwrap();
        index.upsert(&sample_record("pool-1", "a/b.txt", "/drive-a")).unwrap();
        index.upsert(&sample_record("pool-1", "a/b.txt", "/drive-b")).unwrap();

        index.remove_all("pool-1", "a/b.txt").unwrap();

        assert!(index.get_replicas("pool-1", "a/b.txt").unwrap().is_empty());
    }

    #[test]
    fn get_all_for_pool_returns_every_relpath() {
        let dir = tempdir().unwrap();
        let index = MetadataIndex::open(dir.path().join("idx.db")).unwrap();
        index.upsert(&sample_record("pool-1", "a.txt", "/drive-a")).unwrap();
        index.upsert(&sample_record("pool-1", "b.txt", "/drive-a")).unwrap();

        let all = index.get_all_for_pool("pool-1").unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn pools_are_isolated_from_each_other() {
        let dir = tempdir().unwrap();
        let index = MetadataIndex::open(dir.path().join("idx.db")).unwrap();
        index.upsert(&sample_record("pool-1", "a.txt", "/drive-a")).unwrap();
        index.upsert(&sample_record("pool-2", "a.txt", "/drive-a")).unwrap();

        assert_eq!(index.get_all_for_pool("pool-1").unwrap().len(), 1);
        assert_eq!(index.get_all_for_pool("pool-2").unwrap().len(), 1);
    }
}
