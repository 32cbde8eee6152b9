//! Public engine API tying together drive probing, rule resolution,
//! placement, the write coordinator, the read self-healer, and the
//! rebalancer (spec §6).

use crate::config::EngineConfig;
use crate::disk::{probe_drive_health, DeviceClass, DriveHealth, PoolDrive};
use crate::error::StorageError;
use crate::index::{self, MetadataIndex};
use crate::path_utils::{join_on_drive, sanitize_relpath};
use crate::pool::{mount_point_hint, PoolKind, StoragePool};
use crate::rebalance::{self, RebalanceReport};
use crate::read;
use crate::rules::PoolRule;
use crate::write;
use std::collections::HashSet;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use uuid::Uuid;
use walkdir::WalkDir;

/// The engine holds every pool it manages in memory, backed by the shared
/// metadata index on disk. Cloning a `StoragePool` out of the engine (as
/// `get_pool`/`list_pools` do) returns a stable point-in-time snapshot; it
/// does not track subsequent engine mutations (spec §B supplemented feature).
pub struct StorageEngine {
    pools: RwLock<std::collections::HashMap<Uuid, StoragePool>>,
    index: MetadataIndex,
    config: EngineConfig,
}

impl StorageEngine {
    pub fn new(config: EngineConfig) -> Result<Self, StorageError> {
        let db_path = index::default_db_path(&config.db_filename);
        let index = MetadataIndex::open(db_path).map_err(StorageError::IoFailure)?;
        Ok(StorageEngine { pools: RwLock::new(std::collections::HashMap::new()), index, config })
    }

    pub fn with_db_path(config: EngineConfig, db_path: PathBuf) -> Result<Self, StorageError> {
        let index = MetadataIndex::open(db_path).map_err(StorageError::IoFailure)?;
        Ok(StorageEngine { pools: RwLock::new(std::collections::HashMap::new()), index, config })
    }

    /// Create a pool seeded with at least one drive (spec §6: fails
    /// `ArgEmpty` if `name` is blank or `drive_paths` is empty — a pool
    /// cannot be left with zero drives). Drives synthesize a `drive-{i}`
    /// label and default to `DeviceClass::Hdd`; callers wanting specific
    /// labels or device classes for the initial drives should follow up
    /// with `add_drive` to override them.
    pub fn create_pool(&self, name: &str, drive_paths: &[PathBuf], kind: PoolKind) -> Result<Uuid, StorageError> {
        if name.trim().is_empty() || drive_paths.is_empty() {
            return Err(StorageError::ArgEmpty);
        }
        let mut pool = StoragePool::new(name, kind);
        pool.mount_point_hint = Some(mount_point_hint(&pool.name, &pool.id));

        for (i, root) in drive_paths.iter().enumerate() {
            let label = format!("drive-{i}");
            let mut drive = PoolDrive::new(root.clone(), label, DeviceClass::Hdd).map_err(StorageError::IoFailure)?;
            drive.check_health(&self.config);
            pool.drives.push(drive);
        }

        let id = pool.id;
        self.pools.write().expect("pool map lock poisoned").insert(id, pool);
        log::info!("created pool {} ({}) with {} drive(s)", id, name, drive_paths.len());
        Ok(id)
    }

    pub fn add_drive(
        &self,
        pool_id: Uuid,
        root: PathBuf,
        label: &str,
        device_class: DeviceClass,
    ) -> Result<(), StorageError> {
        if label.trim().is_empty() {
            return Err(StorageError::ArgEmpty);
        }
        let mut pools = self.pools.write().expect("pool map lock poisoned");
        let pool = pools.get_mut(&pool_id).ok_or_else(|| StorageError::PoolNotFound(pool_id.to_string()))?;

        let mut drive = PoolDrive::new(root, label.to_string(), device_class).map_err(StorageError::IoFailure)?;
        drive.check_health(&self.config);
        pool.drives.push(drive);
        pool.touch();
        log::info!("added drive {} to pool {}", label, pool.name);
        Ok(())
    }

    pub fn remove_drive(&self, pool_id: Uuid, label: &str) -> Result<(), StorageError> {
        let mut pools = self.pools.write().expect("pool map lock poisoned");
        let pool = pools.get_mut(&pool_id).ok_or_else(|| StorageError::PoolNotFound(pool_id.to_string()))?;

        let before = pool.drives.len();
        pool.drives.retain(|d| d.label != label);
        if pool.drives.len() == before {
            return Err(StorageError::IoFailure(anyhow::anyhow!("drive '{}' not found in pool", label)));
        }
        pool.touch();
        log::info!("removed drive {} from pool {}", label, pool.name);
        Ok(())
    }

    pub fn add_rule(&self, pool_id: Uuid, rule: PoolRule) -> Result<(), StorageError> {
        let mut pools = self.pools.write().expect("pool map lock poisoned");
        let pool = pools.get_mut(&pool_id).ok_or_else(|| StorageError::PoolNotFound(pool_id.to_string()))?;
        pool.rules.push(rule);
        pool.touch();
        Ok(())
    }

    pub fn get_pool(&self, pool_id: Uuid) -> Result<StoragePool, StorageError> {
        self.pools
            .read()
            .expect("pool map lock poisoned")
            .get(&pool_id)
            .cloned()
            .ok_or_else(|| StorageError::PoolNotFound(pool_id.to_string()))
    }

    pub fn list_pools(&self) -> Vec<StoragePool> {
        self.pools.read().expect("pool map lock poisoned").values().cloned().collect()
    }

    pub fn write<R: Read + Seek>(&self, pool_id: Uuid, rel_path: &str, reader: &mut R) -> Result<(), StorageError> {
        if rel_path.trim().is_empty() {
            return Err(StorageError::ArgEmpty);
        }
        let mut pools = self.pools.write().expect("pool map lock poisoned");
        let pool = pools.get_mut(&pool_id).ok_or_else(|| StorageError::PoolNotFound(pool_id.to_string()))?;
        write::write_file(pool, &self.index, &self.config, rel_path, reader)
    }

    pub fn read(&self, pool_id: Uuid, rel_path: &str) -> Result<Vec<u8>, StorageError> {
        if rel_path.trim().is_empty() {
            return Err(StorageError::ArgEmpty);
        }
        let mut pools = self.pools.write().expect("pool map lock poisoned");
        let pool = pools.get_mut(&pool_id).ok_or_else(|| StorageError::PoolNotFound(pool_id.to_string()))?;
        read::read_file(pool, &self.index, &self.config, rel_path)
    }

    pub fn delete(&self, pool_id: Uuid, rel_path: &str) -> Result<(), StorageError> {
        if rel_path.trim().is_empty() {
            return Err(StorageError::ArgEmpty);
        }
        let sanitized = sanitize_relpath(rel_path)?;
        let mut pools = self.pools.write().expect("pool map lock poisoned");
        let pool = pools.get_mut(&pool_id).ok_or_else(|| StorageError::PoolNotFound(pool_id.to_string()))?;

        for drive in &pool.drives {
            let path = join_on_drive(&drive.root, &sanitized);
            if path.is_file() {
                if let Err(e) = std::fs::remove_file(&path) {
                    log::warn!("failed to delete {}: {}", path.display(), e);
                }
            }
        }
        self.index.remove_all(&pool_id.to_string(), &sanitized).map_err(StorageError::IoFailure)?;
        pool.touch();
        Ok(())
    }

    pub fn exists(&self, pool_id: Uuid, rel_path: &str) -> Result<bool, StorageError> {
        if rel_path.trim().is_empty() {
            return Err(StorageError::ArgEmpty);
        }
        let sanitized = sanitize_relpath(rel_path)?;
        let pools = self.pools.read().expect("pool map lock poisoned");
        let pool = pools.get(&pool_id).ok_or_else(|| StorageError::PoolNotFound(pool_id.to_string()))?;

        if pool.drives.iter().any(|d| join_on_drive(&d.root, &sanitized).is_file()) {
            return Ok(true);
        }
        self.index.has_any_replica(&pool_id.to_string(), &sanitized).map_err(StorageError::IoFailure)
    }

    /// List every relpath in the pool matching `pattern`, evaluated with the
    /// host filesystem's native glob semantics rather than the rule
    /// resolver's glob matcher.
    pub fn list(&self, pool_id: Uuid, pattern: &str) -> Result<Vec<String>, StorageError> {
        let glob_pattern = glob::Pattern::new(pattern)
            .map_err(|e| StorageError::InvalidPath(format!("invalid glob pattern: {e}")))?;
        let pools = self.pools.read().expect("pool map lock poisoned");
        let pool = pools.get(&pool_id).ok_or_else(|| StorageError::PoolNotFound(pool_id.to_string()))?;

        let mut found: HashSet<String> = HashSet::new();
        for drive in &pool.drives {
            for entry in WalkDir::new(&drive.root).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let file_name = entry.file_name().to_string_lossy();
                if rebalance::is_operational_residue(&file_name, &self.config) {
                    continue;
                }
                if let Ok(rel) = entry.path().strip_prefix(&drive.root) {
                    let rel_str = rel.to_string_lossy().replace('\\', "/");
                    if glob_pattern.matches(&rel_str) {
                        found.insert(rel_str);
                    }
                }
            }
        }

        let mut result: Vec<String> = found.into_iter().collect();
        result.sort();
        Ok(result)
    }

    pub fn rebalance(&self, pool_id: Uuid) -> Result<RebalanceReport, StorageError> {
        let mut pools = self.pools.write().expect("pool map lock poisoned");
        let pool = pools.get_mut(&pool_id).ok_or_else(|| StorageError::PoolNotFound(pool_id.to_string()))?;
        rebalance::rebalance_pool(pool, &self.index, &self.config)
    }

    /// Probe a drive's health, whether or not it belongs to any pool the
    /// engine currently manages.
    pub fn check_drive_health(&self, root: &Path) -> DriveHealth {
        probe_drive_health(root, &self.config)
    }

    /// Re-probe and update the recorded health of a drive already in a pool.
    pub fn refresh_drive_health(&self, pool_id: Uuid, label: &str) -> Result<DriveHealth, StorageError> {
        let mut pools = self.pools.write().expect("pool map lock poisoned");
        let pool = pools.get_mut(&pool_id).ok_or_else(|| StorageError::PoolNotFound(pool_id.to_string()))?;
        let drive = pool
            .drives
            .iter_mut()
            .find(|d| d.label == label)
            .ok_or_else(|| StorageError::IoFailure(anyhow::anyhow!("drive '{}' not found in pool", label)))?;
        let state = drive.check_health(&self.config);
        Ok(DriveHealth { state, total_bytes: drive.total_bytes, free_bytes: drive.free_bytes })
    }
}
