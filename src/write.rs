//! Two-phase-commit write coordinator (spec component C8).
//!
//! Phase 1 stages an identical copy to every selected drive's `.2pc` temp
//! file, verifying all staged copies hash identically before Phase 2
//! promotes each temp file into place. A stream must be seekable because
//! phase 1 re-reads it once per selected drive rather than buffering the
//! whole file in memory.

use crate::config::EngineConfig;
use crate::error::StorageError;
use crate::hash;
use crate::index::{drive_root_key, MetadataIndex, ReplicaRecord};
use crate::path_utils::{join_on_drive, sanitize_relpath};
use crate::pool::StoragePool;
use crate::rules::resolve_rule;
use crate::scheduler::select_for_write;
use chrono::Utc;
use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

/// Write `reader`'s content to `rel_path` within `pool`, replicated to
/// `rule.duplication` drives as resolved from the pool's rule set.
pub fn write_file<R: Read + Seek>(
    pool: &mut StoragePool,
    index: &MetadataIndex,
    config: &EngineConfig,
    rel_path: &str,
    reader: &mut R,
) -> Result<(), StorageError> {
    let sanitized = sanitize_relpath(rel_path)?;
    let size = stream_len(reader).map_err(|e| StorageError::IoFailure(e.into()))?;
    let rule = resolve_rule(&pool.rules, &sanitized).clone();

    let selected = select_for_write(&pool.drives, &rule, size, config)?;
    log::debug!(
        "write {}: rule pattern {:?} selected {} drive(s) for {} bytes",
        sanitized,
        rule.pattern,
        selected.len(),
        size
    );

    let mut staged: Vec<(usize, PathBuf, u64, String)> = Vec::new();
    for &idx in &selected {
        hash::rewind(reader).map_err(|e| StorageError::IoFailure(e.into()))?;
        let final_path = join_on_drive(&pool.drives[idx].root, &sanitized);
        let temp_path = staging_path(&final_path, config);
        match hash::stage_stream(reader, &temp_path) {
            Ok((written, digest)) => staged.push((idx, temp_path, written, digest)),
            Err(e) => {
                for (_, temp, _, _) in &staged {
                    hash::remove_if_exists(temp);
                }
                hash::remove_if_exists(&temp_path);
                return Err(StorageError::IoFailure(e));
            }
        }
    }

    let distinct_hashes: HashSet<&String> = staged.iter().map(|(_, _, _, h)| h).collect();
    if distinct_hashes.len() != 1 {
        log::error!(
            "write {}: integrity mismatch across {} staged replicas ({} distinct hashes), aborting",
            sanitized,
            staged.len(),
            distinct_hashes.len()
        );
        for (_, temp_path, _, _) in &staged {
            hash::remove_if_exists(temp_path);
        }
        return Err(StorageError::IntegrityMismatch(format!(
            "{} distinct content hashes across {} staged replicas of {}",
            distinct_hashes.len(),
            staged.len(),
            sanitized
        )));
    }

    let final_hash = staged[0].3.clone();
    let now = Utc::now().to_rfc3339();

    for (idx, temp_path, written_size, _) in &staged {
        let final_path = join_on_drive(&pool.drives[*idx].root, &sanitized);
        hash::atomic_replace(temp_path, &final_path).map_err(StorageError::IoFailure)?;

        let record = ReplicaRecord {
            pool_id: pool.id.to_string(),
            rel_path: sanitized.clone(),
            drive_root: drive_root_key(&pool.drives[*idx].root),
            size_bytes: *written_size,
            sha256: final_hash.clone(),
            modified_utc: now.clone(),
        };
        index.upsert(&record).map_err(StorageError::IoFailure)?;

        if let Some(drive) = pool.drives.get_mut(*idx) {
            if let Err(e) = drive.refresh_usage() {
                log::warn!("failed to refresh usage for {}: {}", drive.root.display(), e);
            }
        }
    }

    pool.touch();
    log::info!("write {}: committed to {} replica(s)", sanitized, staged.len());
    Ok(())
}

fn staging_path(final_path: &PathBuf, config: &EngineConfig) -> PathBuf {
    let mut name = final_path.clone().into_os_string();
    name.push(&config.staging_suffix);
    PathBuf::from(name)
}

fn stream_len<S: Seek>(stream: &mut S) -> std::io::Result<u64> {
    let current = stream.seek(SeekFrom::Current(0))?;
    let end = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(current))?;
    Ok(end)
}
