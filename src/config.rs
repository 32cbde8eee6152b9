use crate::disk::DeviceClass;
use serde::{Deserialize, Serialize};

/// Weights for the placement scorer's three terms (spec §4.7). Deliberately
/// sum to ~0.90, not 1.0 — the tier and SSD multipliers cover the rest;
/// validated at `build()`/`validate()` time rather than enforced by the type
/// itself, since callers may want to experiment off that sum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub space_ratio: f64,
    pub io_norm: f64,
    pub health: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights { space_ratio: 0.45, io_norm: 0.35, health: 0.10 }
    }
}

/// Per-device-class IO score feeding the placement scorer's `io_norm` term
/// (spec §4.7). Values are relative, not calibrated to any real benchmark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoScoreTable {
    pub hdd: f64,
    pub ssd: f64,
    pub nvme: f64,
    pub network: f64,
    pub removable: f64,
}

impl Default for IoScoreTable {
    fn default() -> Self {
        // spec §4.7: io_score / 3.0, with a 0.2 floor for anything below hdd.
        IoScoreTable { hdd: 1.0 / 3.0, ssd: 2.0 / 3.0, nvme: 1.0, network: 0.8 / 3.0, removable: 0.2 }
    }
}

/// Tier multipliers applied on top of the base placement score (spec §4.7):
/// exact tier match, Hot preferred but only Warm actually available, and the
/// catch-all for everything else; `none` applies when a rule names no
/// preferred tier at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierMultipliers {
    pub exact_match: f64,
    pub hot_pref_warm_actual: f64,
    pub otherwise: f64,
    pub none: f64,
}

impl Default for TierMultipliers {
    fn default() -> Self {
        TierMultipliers { exact_match: 1.2, hot_pref_warm_actual: 1.0, otherwise: 0.8, none: 1.0 }
    }
}

/// Engine-wide tunables (spec §A.3). Distinct from `StoragePool`/`PoolRule`,
/// which hold per-pool data; this governs process-wide behavior shared by
/// every pool the engine manages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Filename of the metadata index database under the app-data directory.
    pub db_filename: String,
    /// Filename prefix for health-check sentinel files written to drive roots.
    pub sentinel_prefix: String,
    /// Suffix appended to staging files during the write coordinator's phase 1.
    pub staging_suffix: String,
    /// Suffix used for transient rename-safety temp files (`copy_with_replace`).
    pub temp_suffix: String,
    /// Prefix used for atomic-replace backup files.
    pub backup_prefix: String,
    /// Multiplier applied when a rule has `prefer_ssd` set and the drive is
    /// solid-state (spec §4.7).
    pub ssd_multiplier: f64,
    pub score_weights: ScoreWeights,
    pub io_scores: IoScoreTable,
    pub tier_multipliers: TierMultipliers,
}

impl EngineConfig {
    pub fn io_score_for(&self, class: DeviceClass) -> f64 {
        match class {
            DeviceClass::Hdd => self.io_scores.hdd,
            DeviceClass::Ssd => self.io_scores.ssd,
            DeviceClass::Nvme => self.io_scores.nvme,
            DeviceClass::Network => self.io_scores.network,
            DeviceClass::Removable => self.io_scores.removable,
        }
    }

    /// Default configuration for normal use.
    pub fn production() -> Self {
        EngineConfig {
            db_filename: "kydras.db".to_string(),
            sentinel_prefix: ".kydras_health_".to_string(),
            staging_suffix: ".2pc".to_string(),
            temp_suffix: ".tmp".to_string(),
            backup_prefix: ".bak_".to_string(),
            ssd_multiplier: 1.1,
            score_weights: ScoreWeights::default(),
            io_scores: IoScoreTable::default(),
            tier_multipliers: TierMultipliers::default(),
        }
    }

    /// Testing configuration: same scoring behavior, shorter-lived names.
    pub fn testing() -> Self {
        let mut config = Self::production();
        config.db_filename = "kydras-test.db".to_string();
        config
    }

    /// Load from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).map_err(|e| anyhow::anyhow!("failed to parse engine config: {}", e))
    }

    /// Serialize to a pretty JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Validate the configuration, returning every problem found rather than
    /// failing fast on the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.db_filename.trim().is_empty() {
            errors.push("db_filename must not be empty".to_string());
        }
        if self.sentinel_prefix.trim().is_empty() {
            errors.push("sentinel_prefix must not be empty".to_string());
        }
        if self.ssd_multiplier <= 0.0 {
            errors.push("ssd_multiplier must be > 0".to_string());
        }

        let weight_sum =
            self.score_weights.space_ratio + self.score_weights.io_norm + self.score_weights.health;
        if (weight_sum - 0.90).abs() > 0.01 {
            errors.push(format!("score weights must sum to ~0.90, got {:.3}", weight_sum));
        }

        for (name, value) in [
            ("io_scores.hdd", self.io_scores.hdd),
            ("io_scores.ssd", self.io_scores.ssd),
            ("io_scores.nvme", self.io_scores.nvme),
            ("io_scores.network", self.io_scores.network),
            ("io_scores.removable", self.io_scores.removable),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("{} must be within [0, 1], got {}", name, value));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::production()
    }
}

/// Fluent builder over `EngineConfig`.
pub struct ConfigBuilder {
    config: EngineConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        ConfigBuilder { config: EngineConfig::production() }
    }

    pub fn from_preset(preset: &str) -> Self {
        let config = match preset {
            "testing" => EngineConfig::testing(),
            _ => EngineConfig::production(),
        };
        ConfigBuilder { config }
    }

    pub fn db_filename(mut self, name: impl Into<String>) -> Self {
        self.config.db_filename = name.into();
        self
    }

    pub fn ssd_multiplier(mut self, value: f64) -> Self {
        self.config.ssd_multiplier = value;
        self
    }

    pub fn score_weights(mut self, weights: ScoreWeights) -> Self {
        self.config.score_weights = weights;
        self
    }

    pub fn build(self) -> anyhow::Result<EngineConfig> {
        match self.config.validate() {
            Ok(()) => Ok(self.config),
            Err(errors) => Err(anyhow::anyhow!("engine config validation failed: {}", errors.join("; "))),
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_config_validates() {
        assert!(EngineConfig::production().validate().is_ok());
    }

    #[test]
    fn json_roundtrip_preserves_values() {
        let config = EngineConfig::production();
        let json = config.to_json();
        let parsed = EngineConfig::from_json(&json).unwrap();
        assert_eq!(parsed.db_filename, config.db_filename);
        assert_eq!(parsed.ssd_multiplier, config.ssd_multiplier);
    }

    #[test]
    fn validate_rejects_unbalanced_weights() {
        let mut config = EngineConfig::production();
        config.score_weights = ScoreWeights { space_ratio: 0.9, io_norm: 0.9, health: 0.9 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_applies_overrides_and_validates() {
        let config = ConfigBuilder::new().db_filename("custom.db").ssd_multiplier(1.3).build().unwrap();
        assert_eq!(config.db_filename, "custom.db");
        assert_eq!(config.ssd_multiplier, 1.3);
    }

    #[test]
    fn builder_rejects_invalid_multiplier() {
        let result = ConfigBuilder::new().ssd_multiplier(-1.0).build();
        assert!(result.is_err());
    }
}
