//! Pool data model: the in-memory record of a pool's drives and rules.

use crate::disk::PoolDrive;
use crate::rules::PoolRule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broad intent behind a pool, informing nothing structural by itself —
/// it is carried through to `list_pools`/`get_pool` output so a caller can
/// group pools without re-deriving intent from rule contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolKind {
    Jbod,
    Mirror,
    Performance,
    Archive,
    Custom,
}

/// A pool of drives with an ordered rule set governing replica placement.
/// Held entirely in memory for the engine's lifetime; durable state lives in
/// the metadata index and on the drives themselves, so a pool can be
/// reconstructed from `add_drive` calls after a restart without data loss,
/// though rule configuration itself is not currently persisted (spec §9
/// open question, resolved as out of scope for this version).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoragePool {
    pub id: Uuid,
    pub name: String,
    pub kind: PoolKind,
    pub mount_point_hint: Option<String>,
    pub drives: Vec<PoolDrive>,
    pub rules: Vec<PoolRule>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl StoragePool {
    pub fn new(name: impl Into<String>, kind: PoolKind) -> Self {
        let now = Utc::now();
        StoragePool {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            mount_point_hint: None,
            drives: Vec::new(),
            rules: Vec::new(),
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_utc = Utc::now();
    }

    /// Drives currently eligible for new placements (spec §4.7 step 1).
    pub fn eligible_drives(&self) -> impl Iterator<Item = &PoolDrive> {
        self.drives.iter().filter(|d| d.health.is_eligible())
    }

    pub fn find_drive_by_label(&self, label: &str) -> Option<&PoolDrive> {
        self.drives.iter().find(|d| d.label == label)
    }

    pub fn find_drive_mut(&mut self, root: &std::path::Path) -> Option<&mut PoolDrive> {
        self.drives.iter_mut().find(|d| d.root == root)
    }
}

/// A host-presentable mount-point hint, derived purely from a pool's name —
/// never touches the filesystem, so it is safe to call before a pool has any
/// drives or even exists (spec §6: `K:\<name>` on Windows-like hosts,
/// `/pools/<name>` elsewhere; display-only, the engine mounts nothing there).
pub fn mount_point_hint(pool_name: &str, _pool_id: &Uuid) -> String {
    if cfg!(windows) {
        format!("K:\\{pool_name}")
    } else {
        format!("/pools/{pool_name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pool_has_matching_created_and_updated_timestamps() {
        let pool = StoragePool::new("archive", PoolKind::Archive);
        assert_eq!(pool.created_utc, pool.updated_utc);
        assert!(pool.drives.is_empty());
        assert!(pool.rules.is_empty());
    }

    #[test]
    fn touch_advances_updated_utc() {
        let mut pool = StoragePool::new("archive", PoolKind::Archive);
        let created = pool.created_utc;
        pool.touch();
        assert_eq!(pool.created_utc, created);
        assert!(pool.updated_utc >= created);
    }

    #[test]
    fn mount_point_hint_is_deterministic_and_pure() {
        let id = Uuid::new_v4();
        let a = mount_point_hint("My Pool!", &id);
        let b = mount_point_hint("My Pool!", &id);
        assert_eq!(a, b);
        if cfg!(windows) {
            assert_eq!(a, "K:\\My Pool!");
        } else {
            assert_eq!(a, "/pools/My Pool!");
        }
    }
}
