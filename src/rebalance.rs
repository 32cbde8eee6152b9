//! Pool-wide rebalancer (spec component C10).
//!
//! Walks every drive plus the metadata index to find the union of files the
//! pool holds, then for each one reconciles the actual replica count to the
//! rule-required duplication level: copies to under-replicated files,
//! evicts from over-replicated ones using the same scorer that ranks new
//! placements. An integrity mismatch while copying a missing replica aborts
//! the whole rebalance; individual eviction failures are logged and skipped.

use crate::config::EngineConfig;
use crate::error::StorageError;
use crate::hash;
use crate::index::{drive_root_key, MetadataIndex, ReplicaRecord};
use crate::path_utils::join_on_drive;
use crate::pool::StoragePool;
use crate::rules::resolve_rule;
use crate::scheduler::{rank_for_eviction, score_drive};
use chrono::Utc;
use std::collections::HashSet;
use walkdir::WalkDir;

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct RebalanceReport {
    pub files_considered: usize,
    pub replicas_added: usize,
    pub replicas_evicted: usize,
    pub orphans_removed: usize,
}

/// Reconcile every file's replica count in `pool` to its rule's duplication
/// level.
pub fn rebalance_pool(
    pool: &mut StoragePool,
    index: &MetadataIndex,
    config: &EngineConfig,
) -> Result<RebalanceReport, StorageError> {
    let pool_id = pool.id.to_string();
    let mut report = RebalanceReport::default();

    let rel_paths = discover_rel_paths(pool, index, config)?;

    for rel_path in rel_paths {
        report.files_considered += 1;

        let mut holders: Vec<usize> = (0..pool.drives.len())
            .filter(|&i| join_on_drive(&pool.drives[i].root, &rel_path).is_file())
            .collect();

        if holders.is_empty() {
            index.remove_all(&pool_id, &rel_path).map_err(StorageError::IoFailure)?;
            report.orphans_removed += 1;
            continue;
        }

        let rule = resolve_rule(&pool.rules, &rel_path).clone();
        let required = rule.duplication;

        // spec §4.10 step c: the reference is the first holder that exists
        // and hashes successfully, not a majority vote across holders.
        let mut reference = None;
        for &i in &holders {
            let path = join_on_drive(&pool.drives[i].root, &rel_path);
            if let Ok(h) = hash::hash_file(&path) {
                reference = Some((i, h));
                break;
            }
        }
        let (reference_idx, reference_hash) = match reference {
            Some(pair) => pair,
            None => continue,
        };
        let reference_path = join_on_drive(&pool.drives[reference_idx].root, &rel_path);

        if holders.len() < required {
            let needed = required - holders.len();
            let non_holders: Vec<usize> = (0..pool.drives.len()).filter(|i| !holders.contains(i)).collect();
            let eligible: Vec<usize> = non_holders
                .into_iter()
                .filter(|&i| pool.drives[i].health.is_eligible())
                .collect();

            let mut ranked = eligible;
            ranked.sort_by(|&a, &b| {
                score_drive(&pool.drives[b], &rule, config)
                    .partial_cmp(&score_drive(&pool.drives[a], &rule, config))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            for &target_idx in ranked.iter().take(needed) {
                let target_path = join_on_drive(&pool.drives[target_idx].root, &rel_path);
                hash::copy_with_replace(&reference_path, &target_path).map_err(StorageError::IoFailure)?;
                let verify_hash = hash::hash_file(&target_path).map_err(StorageError::IoFailure)?;
                if verify_hash != reference_hash {
                    hash::remove_if_exists(&target_path);
                    return Err(StorageError::IntegrityMismatch(format!(
                        "rebalance copy of {} to {} produced a different hash",
                        rel_path,
                        target_path.display()
                    )));
                }

                let size = std::fs::metadata(&target_path).map(|m| m.len()).unwrap_or(0);
                let record = ReplicaRecord {
                    pool_id: pool_id.clone(),
                    rel_path: rel_path.clone(),
                    drive_root: drive_root_key(&pool.drives[target_idx].root),
                    size_bytes: size,
                    sha256: reference_hash.clone(),
                    modified_utc: Utc::now().to_rfc3339(),
                };
                index.upsert(&record).map_err(StorageError::IoFailure)?;
                holders.push(target_idx);
                report.replicas_added += 1;
                log::debug!("rebalance: added replica of {} on {}", rel_path, pool.drives[target_idx].root.display());
            }
        } else if holders.len() > required {
            let evict_count = holders.len() - required;
            let worst_first = rank_for_eviction(&pool.drives, &holders, &rule, config);
            for &victim_idx in worst_first.iter().take(evict_count) {
                let victim_path = join_on_drive(&pool.drives[victim_idx].root, &rel_path);
                match std::fs::remove_file(&victim_path) {
                    Ok(()) => {
                        if let Err(e) = index.remove(&pool_id, &rel_path, &drive_root_key(&pool.drives[victim_idx].root)) {
                            log::warn!("evicted {} but failed to update index: {}", victim_path.display(), e);
                        }
                        report.replicas_evicted += 1;
                        log::debug!("rebalance: evicted over-replicated copy of {} from {}", rel_path, victim_path.display());
                    }
                    Err(e) => {
                        log::warn!("rebalance: failed to evict {}: {}", victim_path.display(), e);
                    }
                }
            }
        }
    }

    for drive in &mut pool.drives {
        if let Err(e) = drive.refresh_usage() {
            log::warn!("failed to refresh usage for {} after rebalance: {}", drive.root.display(), e);
        }
    }
    pool.touch();

    log::info!(
        "rebalance of pool {}: {} file(s) considered, {} replica(s) added, {} evicted, {} orphan(s) removed",
        pool.name,
        report.files_considered,
        report.replicas_added,
        report.replicas_evicted,
        report.orphans_removed
    );

    Ok(report)
}

fn discover_rel_paths(
    pool: &StoragePool,
    index: &MetadataIndex,
    config: &EngineConfig,
) -> Result<Vec<String>, StorageError> {
    let mut rel_paths: HashSet<String> = index
        .get_all_for_pool(&pool.id.to_string())
        .map_err(StorageError::IoFailure)?
        .into_iter()
        .map(|r| r.rel_path)
        .collect();

    for drive in &pool.drives {
        for entry in WalkDir::new(&drive.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if is_operational_residue(&file_name, config) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&drive.root) {
                rel_paths.insert(rel.to_string_lossy().to_string());
            }
        }
    }

    Ok(rel_paths.into_iter().collect())
}

pub(crate) fn is_operational_residue(file_name: &str, config: &EngineConfig) -> bool {
    file_name.starts_with(&config.sentinel_prefix)
        || file_name.ends_with(&config.staging_suffix)
        || file_name.ends_with(&config.temp_suffix)
        || file_name.contains(&config.backup_prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::{DeviceClass, PoolDrive};
    use crate::pool::PoolKind;
    use crate::rules::PoolRule;
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
    fn rebalance_adds_missing_replica_to_reach_duplication() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::production();
        let mut pool = make_pool(dir.path(), 3);
        pool.rules.push(PoolRule::new("**").with_duplication(1));
        let index = MetadataIndex::open(dir.path().join("idx.db")).unwrap();

        let mut cursor = Cursor::new(b"content".to_vec());
        write_file(&mut pool, &index, &config, "a.txt", &mut cursor).unwrap();

        pool.rules.clear();
        pool.rules.push(PoolRule::new("**").with_duplication(2));

        let report = rebalance_pool(&mut pool, &index, &config).unwrap();
        assert_eq!(report.replicas_added, 1);

        let records = index.get_replicas(&pool.id.to_string(), "a.txt").unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn rebalance_evicts_excess_replicas() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::production();
        let mut pool = make_pool(dir.path(), 3);
        pool.rules.push(PoolRule::new("**").with_duplication(3));
        let index = MetadataIndex::open(dir.path().join("idx.db")).unwrap();

        let mut cursor = Cursor::new(b"content".to_vec());
        write_file(&mut pool, &index, &config, "a.txt", &mut cursor).unwrap();

        pool.rules.clear();
        pool.rules.push(PoolRule::new("**").with_duplication(1));

        let report = rebalance_pool(&mut pool, &index, &config).unwrap();
        assert_eq!(report.replicas_evicted, 2);

        let records = index.get_replicas(&pool.id.to_string(), "a.txt").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn rebalance_removes_orphaned_index_entries() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::production();
        let mut pool = make_pool(dir.path(), 1);
        let index = MetadataIndex::open(dir.path().join("idx.db")).unwrap();

        let mut cursor = Cursor::new(b"content".to_vec());
        write_file(&mut pool, &index, &config, "a.txt", &mut cursor).unwrap();

        let path = join_on_drive(&pool.drives[0].root, "a.txt");
        std::fs::remove_file(&path).unwrap();

        let report = rebalance_pool(&mut pool, &index, &config).unwrap();
        assert_eq!(report.orphans_removed, 1);
        assert!(index.get_replicas(&pool.id.to_string(), "a.txt").unwrap().is_empty());
    }

    #[test]
    fn rebalance_picks_up_untracked_file_present_on_disk() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::production();
        let mut pool = make_pool(dir.path(), 2);
        pool.rules.push(PoolRule::new("**").with_duplication(2));
        let index = MetadataIndex::open(dir.path().join("idx.db")).unwrap();

        std::fs::write(pool.drives[0].root.join("untracked.txt"), b"surprise").unwrap();

        let report = rebalance_pool(&mut pool, &index, &config).unwrap();
        assert_eq!(report.files_considered, 1);
        assert_eq!(report.replicas_added, 1);
    }
}
