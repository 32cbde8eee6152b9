//! Weighted placement scheduler (spec component C7).
//!
//! `score_drive` is the single scoring function used both to rank
//! candidates for a new write and to rank over-replicated holders for
//! eviction during rebalancing (spec §9 design note) — never duplicate the
//! formula, always call through here.

use crate::config::EngineConfig;
use crate::disk::{PoolDrive, Tier};
use crate::error::StorageError;
use crate::rules::PoolRule;

/// Score one candidate drive for placing a file of `size_bytes` governed by
/// `rule` (spec §4.7). Higher is better.
pub fn score_drive(drive: &PoolDrive, rule: &PoolRule, config: &EngineConfig) -> f64 {
    let weights = &config.score_weights;
    let base = weights.space_ratio * drive.space_ratio()
        + weights.io_norm * drive.io_norm(config)
        + weights.health * drive.health.weight();

    let tier_mult = match rule.preferred_tier {
        None => config.tier_multipliers.none,
        Some(preferred) if preferred == drive.tier() => config.tier_multipliers.exact_match,
        Some(Tier::Hot) if drive.tier() == Tier::Warm => config.tier_multipliers.hot_pref_warm_actual,
        Some(_) => config.tier_multipliers.otherwise,
    };

    let ssd_mult = if rule.prefer_ssd && drive.device_class.is_solid_state() {
        config.ssd_multiplier
    } else {
        1.0
    };

    base * tier_mult * ssd_mult
}

/// Select the indices (into `drives`) of the best `rule.duplication` drives
/// for placing a new file of `size_bytes`, applying the filter chain of
/// spec §4.7: health, then free space, then the advisory target-drive
/// preference, then the rule's max-size ceiling.
pub fn select_for_write(
    drives: &[PoolDrive],
    rule: &PoolRule,
    size_bytes: u64,
    config: &EngineConfig,
) -> Result<Vec<usize>, StorageError> {
    if let Some(max) = rule.max_size_bytes {
        if size_bytes > max {
            return Err(StorageError::InsufficientReplicas { needed: rule.duplication, available: 0 });
        }
    }

    let mut candidates: Vec<usize> = drives
        .iter()
        .enumerate()
        .filter(|(_, d)| d.health.is_eligible())
        .filter(|(_, d)| d.free_bytes >= size_bytes)
        .map(|(i, _)| i)
        .collect();

    if let Some(label) = &rule.target_drive {
        let restricted: Vec<usize> =
            candidates.iter().copied().filter(|&i| &drives[i].label == label).collect();
        if !restricted.is_empty() {
            candidates = restricted;
        }
    }

    if candidates.len() < rule.duplication {
        return Err(StorageError::InsufficientReplicas {
            needed: rule.duplication,
            available: candidates.len(),
        });
    }

    candidates.sort_by(|&a, &b| {
        score_drive(&drives[b], rule, config)
            .partial_cmp(&score_drive(&drives[a], rule, config))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    candidates.truncate(rule.duplication);
    Ok(candidates)
}

/// Rank a set of candidate drive indices from worst to best score, used by
/// the rebalancer to decide which over-replicated holders to evict first
/// (spec §4.10): the front of the returned list is evicted first.
pub fn rank_for_eviction(
    drives: &[PoolDrive],
    indices: &[usize],
    rule: &PoolRule,
    config: &EngineConfig,
) -> Vec<usize> {
    let mut ranked = indices.to_vec();
    ranked.sort_by(|&a, &b| {
        score_drive(&drives[a], rule, config)
            .partial_cmp(&score_drive(&drives[b], rule, config))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}
