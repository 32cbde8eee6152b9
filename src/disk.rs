//! Drive probing and health tracking (spec component C3).
//!
//! A `PoolDrive` wraps a directory root that has been added to a pool. Usage
//! (`total_bytes`/`free_bytes`) is refreshed whenever a drive is added, after
//! every write, and whenever `check_drive_health` is called explicitly.

use crate::config::EngineConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Coarse device class, used both for tiering and for the IO-score lookup
/// that feeds the placement scorer (spec §3, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceClass {
    Hdd,
    Ssd,
    Nvme,
    Network,
    Removable,
}

impl DeviceClass {
    /// Tier derivation is pure and independent of any stored state, so it can
    /// be used both for live drives and for rule "preferred tier" matching.
    pub fn tier(self) -> Tier {
        match self {
            DeviceClass::Nvme | DeviceClass::Ssd => Tier::Hot,
            DeviceClass::Hdd => Tier::Warm,
            DeviceClass::Network | DeviceClass::Removable => Tier::Cold,
        }
    }

    pub fn is_solid_state(self) -> bool {
        matches!(self, DeviceClass::Ssd | DeviceClass::Nvme)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Hot,
    Warm,
    Cold,
}

/// Health as last observed, either from a sentinel-file probe or inferred
/// from a failed operation. `Unknown` is the state of a drive that has never
/// been probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Unknown,
    Healthy,
    Warning,
    Critical,
    Failed,
}

impl HealthState {
    /// Whether the scheduler should consider this drive for new placements
    /// (spec §4.7 step 1: filter by health).
    pub fn is_eligible(self) -> bool {
        matches!(self, HealthState::Unknown | HealthState::Healthy | HealthState::Warning)
    }

    /// Numeric weight fed into the placement score (spec §4.7).
    pub fn weight(self) -> f64 {
        match self {
            HealthState::Healthy => 1.0,
            HealthState::Warning => 0.6,
            HealthState::Critical => 0.2,
            HealthState::Unknown | HealthState::Failed => 0.5,
        }
    }
}

/// A single probe of a drive's health and usage, independent of any pool
/// membership — this is what `check_drive_health` returns for a bare path
/// that may not yet belong to any pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveHealth {
    pub state: HealthState,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// A drive that has been added to a pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolDrive {
    pub root: PathBuf,
    pub label: String,
    pub device_class: DeviceClass,
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub health: HealthState,
}

impl PoolDrive {
    /// Probe `root` fresh and build a new `PoolDrive`. `device_class` cannot
    /// be reliably auto-detected across platforms, so it is supplied by the
    /// caller at `add_drive` time (spec §9 open question, resolved in favor
    /// of explicit input over guessing from mount metadata).
    pub fn new(root: PathBuf, label: String, device_class: DeviceClass) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating drive root {}", root.display()))?;
        let (total_bytes, free_bytes) = probe_usage(&root)?;
        Ok(PoolDrive {
            root,
            label,
            device_class,
            total_bytes,
            free_bytes,
            health: HealthState::Unknown,
        })
    }

    pub fn tier(&self) -> Tier {
        self.device_class.tier()
    }

    /// Re-read free/total space from the filesystem (spec §3: refresh after
    /// add and after every write).
    pub fn refresh_usage(&mut self) -> Result<()> {
        let (total, free) = probe_usage(&self.root)?;
        self.total_bytes = total;
        self.free_bytes = free;
        Ok(())
    }

    /// Write a small sentinel file, read it back, and delete it, downgrading
    /// `self.health` on any failure (spec §3, §4.6 health-check operation).
    pub fn check_health(&mut self, config: &EngineConfig) -> HealthState {
        match probe_health(&self.root, config) {
            Ok(()) => {
                self.health = HealthState::Healthy;
            }
            Err(e) => {
                log::warn!("drive {} failed health probe: {}", self.root.display(), e);
                self.health = HealthState::Warning;
            }
        }
        if self.refresh_usage().is_err() {
            if self.health == HealthState::Healthy {
                self.health = HealthState::Warning;
            }
        } else if self.total_bytes > 0 {
            let free_ratio = self.free_bytes as f64 / self.total_bytes as f64;
            if self.health == HealthState::Healthy && free_ratio < 0.02 {
                self.health = HealthState::Critical;
            }
        }
        self.health
    }

    /// IO-normalization score in `[0, 1]`, looked up from configuration by
    /// device class (spec §4.7).
    pub fn io_norm(&self, config: &EngineConfig) -> f64 {
        config.io_score_for(self.device_class)
    }

    /// Fraction of the drive currently free, used directly in the placement
    /// score's `space_ratio` term.
    pub fn space_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.free_bytes as f64 / self.total_bytes as f64
        }
    }
}

/// Probe health of a bare filesystem path that may not belong to any pool
/// yet (spec §6 `check_drive_health` callable standalone).
pub fn probe_drive_health(root: &Path, config: &EngineConfig) -> DriveHealth {
    let state = match probe_health(root, config) {
        Ok(()) => HealthState::Healthy,
        Err(e) => {
            log::warn!("drive {} failed health probe: {}", root.display(), e);
            HealthState::Warning
        }
    };
    let (total_bytes, free_bytes) = probe_usage(root).unwrap_or((0, 0));
    DriveHealth { state, total_bytes, free_bytes }
}

fn probe_health(root: &Path, config: &EngineConfig) -> Result<()> {
    let sentinel = root.join(format!("{}{}", config.sentinel_prefix, crate::hash::unique_suffix()));
    std::fs::write(&sentinel, b"health-check")
        .with_context(|| format!("writing sentinel to {}", root.display()))?;
    let read_back = std::fs::read(&sentinel)
        .with_context(|| format!("reading sentinel from {}", root.display()))?;
    std::fs::remove_file(&sentinel).ok();
    if read_back != b"health-check" {
        anyhow::bail!("sentinel readback mismatch on {}", root.display());
    }
    Ok(())
}

#[cfg(unix)]
fn probe_usage(root: &Path) -> Result<(u64, u64)> {
    match nix::sys::statvfs::statvfs(root) {
        Ok(stat) => {
            let block_size = stat.fragment_size().max(1) as u64;
            let total = stat.blocks() as u64 * block_size;
            let free = stat.blocks_available() as u64 * block_size;
            Ok((total, free))
        }
        Err(e) => {
            log::warn!("statvfs failed for {}: {}", root.display(), e);
            Ok((0, 0))
        }
    }
}

#[cfg(not(unix))]
fn probe_usage(_root: &Path) -> Result<(u64, u64)> {
    // No portable free-space probe on non-unix targets; spec §3 explicitly
    // allows reporting unknown (0/0) here rather than guessing.
    Ok((0, 0))
}
