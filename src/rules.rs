//! Rule resolution (spec component C6).

use crate::disk::Tier;
use crate::glob::glob_match;
use serde::{Deserialize, Serialize};

/// A single placement rule within a pool. Rules are evaluated in list order;
/// the first whose `pattern` matches wins (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRule {
    pub pattern: String,
    /// Advisory only: the scheduler treats this as a scoring preference, not
    /// a hard requirement, so placement still proceeds if the named drive is
    /// unhealthy or full (spec §4.7 step 3, §9 open question).
    pub target_drive: Option<String>,
    pub duplication: usize,
    pub prefer_ssd: bool,
    pub max_size_bytes: Option<u64>,
    pub preferred_tier: Option<Tier>,
}

impl PoolRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        PoolRule {
            pattern: pattern.into(),
            target_drive: None,
            duplication: 1,
            prefer_ssd: false,
            max_size_bytes: None,
            preferred_tier: None,
        }
    }

    pub fn with_duplication(mut self, duplication: usize) -> Self {
        self.duplication = duplication.max(1);
        self
    }

    pub fn with_target_drive(mut self, label: impl Into<String>) -> Self {
        self.target_drive = Some(label.into());
        self
    }

    pub fn with_prefer_ssd(mut self, prefer_ssd: bool) -> Self {
        self.prefer_ssd = prefer_ssd;
        self
    }

    pub fn with_max_size_bytes(mut self, max: u64) -> Self {
        self.max_size_bytes = Some(max);
        self
    }

    pub fn with_preferred_tier(mut self, tier: Tier) -> Self {
        self.preferred_tier = Some(tier);
        self
    }
}

/// A rule set's default behavior when no rule matches a path: one replica,
/// no constraints (spec §4.6 edge case).
pub fn default_rule() -> PoolRule {
    PoolRule::new("**")
}

/// Resolve the first matching rule for `rel_path`, or the default rule if
/// none match. `rel_path` must already be in glob-segment form (i.e. run
/// through `path_utils::to_glob_segments`' source string).
pub fn resolve_rule<'a>(rules: &'a [PoolRule], rel_path: &str) -> &'a PoolRule {
    rules
        .iter()
        .find(|rule| glob_match(&rule.pattern, rel_path))
        .unwrap_or_else(DEFAULT_RULE_HOLDER)
}

// A 'static default rule instance so `resolve_rule` can return a borrowed
// reference even when the caller's rule list is empty or exhausted.
use std::sync::OnceLock;
static DEFAULT_RULE: OnceLock<PoolRule> = OnceLock::new();
#[allow(non_snake_case)]
fn DEFAULT_RULE_HOLDER() -> &'static PoolRule {
    DEFAULT_RULE.get_or_init(default_rule)
}
