//! Read-time self-healer (spec component C9).
//!
//! Every read probes every drive's copy, serves the one matching the
//! index's first recorded hash (or any hashed replica if none match), and
//! repairs every other drive's copy from that source.
//! Per-replica heal failures are logged and skipped — a read never fails
//! because a *different* drive could not be healed.

use crate::config::EngineConfig;
use crate::error::StorageError;
use crate::hash;
use crate::index::{drive_root_key, MetadataIndex, ReplicaRecord};
use crate::path_utils::{join_on_drive, sanitize_relpath};
use crate::pool::StoragePool;
use chrono::Utc;
use std::path::PathBuf;

struct Probe {
    drive_idx: usize,
    path: PathBuf,
    present: bool,
    hash: Option<String>,
    size: u64,
}

/// Read `rel_path` from `pool`, healing any divergent or missing replica
/// found along the way.
pub fn read_file(
    pool: &mut StoragePool,
    index: &MetadataIndex,
    _config: &EngineConfig,
    rel_path: &str,
) -> Result<Vec<u8>, StorageError> {
    let sanitized = sanitize_relpath(rel_path)?;
    let pool_id = pool.id.to_string();

    let records = index.get_replicas(&pool_id, &sanitized).map_err(StorageError::IoFailure)?;
    // spec §4.9 step 2: expected is the first recorded hash, not a majority vote.
    let expected_hash = records.first().map(|r| r.sha256.clone());

    let mut probes = Vec::with_capacity(pool.drives.len());
    for (i, drive) in pool.drives.iter().enumerate() {
        let path = join_on_drive(&drive.root, &sanitized);
        if path.is_file() {
            match hash::hash_file(&path) {
                Ok(digest) => {
                    let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                    probes.push(Probe { drive_idx: i, path, present: true, hash: Some(digest), size });
                }
                Err(e) => {
                    log::warn!("failed to hash {} while reading {}: {}", path.display(), sanitized, e);
                    probes.push(Probe { drive_idx: i, path, present: true, hash: None, size: 0 });
                }
            }
        } else {
            probes.push(Probe { drive_idx: i, path, present: false, hash: None, size: 0 });
        }
    }

    let source_idx = choose_source(&probes, expected_hash.as_deref()).ok_or_else(|| {
        StorageError::IoFailure(anyhow::anyhow!("no readable replica of {} found in pool", sanitized))
    })?;

    let source_path = probes[source_idx].path.clone();
    let source_hash = probes[source_idx].hash.clone().expect("source probe must have a hash");
    let source_size = probes[source_idx].size;
    let now = Utc::now().to_rfc3339();

    for (i, probe) in probes.iter().enumerate() {
        if i == source_idx {
            continue;
        }
        let needs_heal = !probe.present || probe.hash.as_deref() != Some(source_hash.as_str());
        if !needs_heal {
            continue;
        }
        match hash::copy_with_replace(&source_path, &probe.path) {
            Ok(()) => {
                let record = ReplicaRecord {
                    pool_id: pool_id.clone(),
                    rel_path: sanitized.clone(),
                    drive_root: drive_root_key(&pool.drives[probe.drive_idx].root),
                    size_bytes: source_size,
                    sha256: source_hash.clone(),
                    modified_utc: now.clone(),
                };
                if let Err(e) = index.upsert(&record) {
                    log::warn!("heal of {} on {} succeeded but index update failed: {}", sanitized, probe.path.display(), e);
                }
                log::debug!("healed {} onto {}", sanitized, probe.path.display());
            }
            Err(e) => {
                log::warn!("failed to heal {} onto {}: {}", sanitized, probe.path.display(), e);
            }
        }
    }

    let source_record = ReplicaRecord {
        pool_id: pool_id.clone(),
        rel_path: sanitized.clone(),
        drive_root: drive_root_key(&pool.drives[probes[source_idx].drive_idx].root),
        size_bytes: source_size,
        sha256: source_hash,
        modified_utc: now,
    };
    index.upsert(&source_record).map_err(StorageError::IoFailure)?;

    std::fs::read(&source_path).map_err(|e| StorageError::IoFailure(e.into()))
}

fn choose_source(probes: &[Probe], expected_hash: Option<&str>) -> Option<usize> {
    if let Some(expected) = expected_hash {
        if let Some(idx) = probes.iter().position(|p| p.present && p.hash.as_deref() == Some(expected)) {
            return Some(idx);
        }
    }
    probes.iter().position(|p| p.present && p.hash.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::{DeviceClass, PoolDrive};
    use crate::pool::{PoolKind, StoragePool};
    use crate::write::write_file;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn make_pool(dir: &std::path::Path, n: usize) -> StoragePool {
        let mut pool = StoragePool::new("test", PoolKind::Jbod);
        for i in 0..n {
            let root = dir.join(format!("drive-{i}"));
            let drive = PoolDrive::new(root, format!("drive-{i}"), DeviceClass::Ssd).unwrap();
            pool.drives.push(drive);
        }
        pool
    }

    #[test]
    fn read_returns_written_bytes() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::production();
        let mut pool = make_pool(dir.path(), 1);
        let index = MetadataIndex::open(dir.path().join("idx.db")).unwrap();

        let mut cursor = Cursor::new(b"payload".to_vec());
        write_file(&mut pool, &index, &config, "a.txt", &mut cursor).unwrap();

        let data = read_file(&mut pool, &index, &config, "a.txt").unwrap();
        assert_eq!(data, b"payload");
    }

    #[test]
    fn read_heals_missing_replica() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::production();
        let mut pool = make_pool(dir.path(), 2);
        pool.rules.push(crate::rules::PoolRule::new("**").with_duplication(2));
        let index = MetadataIndex::open(dir.path().join("idx.db")).unwrap();

        let mut cursor = Cursor::new(b"two copies".to_vec());
        write_file(&mut pool, &index, &config, "a.txt", &mut cursor).unwrap();

        let victim_path = join_on_drive(&pool.drives[1].root, "a.txt");
        std::fs::remove_file(&victim_path).unwrap();

        let data = read_file(&mut pool, &index, &config, "a.txt").unwrap();
        assert_eq!(data, b"two copies");
        assert!(victim_path.is_file());
        assert_eq!(std::fs::read(&victim_path).unwrap(), b"two copies");
    }

    #[test]
    fn read_heals_diverged_replica_from_expected_hash() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::production();
        let mut pool = make_pool(dir.path(), 2);
        pool.rules.push(crate::rules::PoolRule::new("**").with_duplication(2));
        let index = MetadataIndex::open(dir.path().join("idx.db")).unwrap();

        let mut cursor = Cursor::new(b"original".to_vec());
        write_file(&mut pool, &index, &config, "a.txt", &mut cursor).unwrap();

        let tampered_path = join_on_drive(&pool.drives[0].root, "a.txt");
        std::fs::write(&tampered_path, b"corrupted!").unwrap();

        let data = read_file(&mut pool, &index, &config, "a.txt").unwrap();
        assert_eq!(data, b"original");
        assert_eq!(std::fs::read(&tampered_path).unwrap(), b"original");
    }

    #[test]
    fn read_errors_when_no_replica_exists() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::production();
        let mut pool = make_pool(dir.path(), 1);
        let index = MetadataIndex::open(dir.path().join("idx.db")).unwrap();

        let result = read_file(&mut pool, &index, &config, "missing.txt");
        assert!(result.is_err());
    }
}
