// ⚙️ Pipeline Configuration - Thresholds as data
// Every tunable lives here. Loaded from JSON; every field has a default so a
// partial file only overrides what it names.

use crate::error::ConfigError;
use anyhow::{Context as AnyhowContext, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// ENTITY RESOLUTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Score at or above this merges automatically (default: 0.92)
    pub auto_merge_threshold: f64,

    /// Score at or above this (and below auto) goes to human review (default: 0.85)
    pub review_threshold: f64,

    /// Characters of the registration number used as a secondary blocking key
    pub registration_prefix_len: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            auto_merge_threshold: 0.92,
            review_threshold: 0.85,
            registration_prefix_len: 6,
        }
    }
}

// ============================================================================
// RELATIONSHIP DERIVATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationConfig {
    /// Minimum shared contracts before a CO_BID_WITH edge is emitted
    pub min_shared_contracts: usize,

    /// Shared contracts at which co-bidding counts as "frequent"
    pub frequent_co_bid_count: usize,

    /// Legal competitive-bidding threshold in PHP (RA 9184 public bidding)
    pub bidding_threshold: f64,

    /// Contracts awarded within this many days of a cluster's first award group together
    pub split_window_days: i64,

    /// Minimum title similarity for contracts to share a split cluster
    pub split_title_similarity: f64,

    /// Surname similarity for FAMILY_OF
    pub family_threshold: f64,

    /// Surname similarity for ASSOCIATED_WITH
    pub association_threshold: f64,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        DerivationConfig {
            min_shared_contracts: 2,
            frequent_co_bid_count: 5,
            bidding_threshold: 5_000_000.0,
            split_window_days: 7,
            split_title_similarity: 0.75,
            family_threshold: 0.97,
            association_threshold: 0.92,
        }
    }
}

// ============================================================================
// DETECTORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Single-bidder rate above which a contractor's single-bid contracts escalate to high
    pub single_bidder_escalation_rate: f64,

    /// Single-bid contracts needed (with the rate exceeded) for the aggregate critical flag
    pub single_bidder_aggregate_min: usize,

    /// Relative difference under which two bids count as identical (0.001 = 0.1%)
    pub identical_bid_epsilon: f64,

    /// HHI at or above which an agency is flagged
    pub hhi_threshold: f64,

    /// Smallest co-bidding community reported as a ring
    pub ring_min_size: usize,

    /// Internal edge density a community needs to be a ring
    pub ring_min_density: f64,

    /// Fraction of internal CO_BID_WITH edges that must be rotating
    pub ring_min_rotation: f64,

    /// Local-moving sweeps allowed to community detection
    pub community_max_iterations: usize,

    /// Longest subcontracting cycle searched for
    pub cycle_max_hops: usize,

    /// DFS steps allowed to cycle enumeration before returning partial results
    pub cycle_max_steps: usize,

    /// Awarded value / registered capital above which a contractor looks like a shell
    pub shell_capital_ratio: f64,

    /// Only contracts awarded inside this window count toward HHI (inclusive)
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            single_bidder_escalation_rate: 0.8,
            single_bidder_aggregate_min: 3,
            identical_bid_epsilon: 0.001,
            hhi_threshold: 0.25,
            ring_min_size: 3,
            ring_min_density: 0.5,
            ring_min_rotation: 0.5,
            community_max_iterations: 50,
            cycle_max_hops: 6,
            cycle_max_steps: 100_000,
            shell_capital_ratio: 100.0,
            window_start: None,
            window_end: None,
        }
    }
}

// ============================================================================
// ANALYTICS + ROLL-UP WEIGHTS
// ============================================================================

/// Dynasty score = weighted sum of saturated counts, divided by the weight total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynastyWeights {
    pub positions: f64,
    pub municipalities: f64,
    pub contractor_ownership: f64,

    /// Count at which each component reaches its full weight
    pub positions_saturation: usize,
    pub municipalities_saturation: usize,
    pub ownership_saturation: usize,
}

impl Default for DynastyWeights {
    fn default() -> Self {
        DynastyWeights {
            positions: 0.4,
            municipalities: 0.35,
            contractor_ownership: 0.25,
            positions_saturation: 5,
            municipalities_saturation: 3,
            ownership_saturation: 2,
        }
    }
}

/// Per-severity contribution to an entity's risk_score (capped at 1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        RiskWeights {
            critical: 0.4,
            high: 0.25,
            medium: 0.1,
            low: 0.05,
        }
    }
}

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub resolver: ResolverConfig,
    pub derivation: DerivationConfig,
    pub detectors: DetectorConfig,
    pub dynasty: DynastyWeights,
    pub risk: RiskWeights,
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: PipelineConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the pipeline meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit_fields = [
            ("resolver.auto_merge_threshold", self.resolver.auto_merge_threshold),
            ("resolver.review_threshold", self.resolver.review_threshold),
            ("derivation.split_title_similarity", self.derivation.split_title_similarity),
            ("derivation.family_threshold", self.derivation.family_threshold),
            ("derivation.association_threshold", self.derivation.association_threshold),
            ("detectors.single_bidder_escalation_rate", self.detectors.single_bidder_escalation_rate),
            ("detectors.hhi_threshold", self.detectors.hhi_threshold),
            ("detectors.ring_min_density", self.detectors.ring_min_density),
            ("detectors.ring_min_rotation", self.detectors.ring_min_rotation),
        ];
        for (field, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfUnitRange { field, value });
            }
        }

        if self.resolver.review_threshold > self.resolver.auto_merge_threshold {
            return Err(ConfigError::InvertedThresholds {
                review: self.resolver.review_threshold,
                auto: self.resolver.auto_merge_threshold,
            });
        }

        if self.derivation.bidding_threshold <= 0.0 {
            return Err(ConfigError::NotPositive { field: "derivation.bidding_threshold" });
        }
        if self.detectors.community_max_iterations == 0 {
            return Err(ConfigError::NotPositive { field: "detectors.community_max_iterations" });
        }
        if self.detectors.cycle_max_steps == 0 || self.detectors.cycle_max_hops == 0 {
            return Err(ConfigError::NotPositive { field: "detectors.cycle_max_steps" });
        }
        // A ring needs at least one internal pair for its density to exist
        if self.detectors.ring_min_size < 2 {
            return Err(ConfigError::TooSmall {
                field: "detectors.ring_min_size",
                min: 2,
                value: self.detectors.ring_min_size,
            });
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resolver.auto_merge_threshold, 0.92);
        assert_eq!(config.resolver.review_threshold, 0.85);
        assert_eq!(config.derivation.min_shared_contracts, 2);
    }

    #[test]
    fn test_partial_file_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "resolver": {{ "auto_merge_threshold": 0.95 }}, "detectors": {{ "hhi_threshold": 0.4 }} }}"#
        )
        .unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();

        assert_eq!(config.resolver.auto_merge_threshold, 0.95);
        assert_eq!(config.resolver.review_threshold, 0.85);
        assert_eq!(config.detectors.hhi_threshold, 0.4);
        assert_eq!(config.derivation.bidding_threshold, 5_000_000.0);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = PipelineConfig::default();
        config.resolver.review_threshold = 0.95;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedThresholds { .. })
        ));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut config = PipelineConfig::default();
        config.detectors.hhi_threshold = 1.5;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfUnitRange { field: "detectors.hhi_threshold", .. })
        ));
    }

    #[test]
    fn test_ring_without_pairs_rejected() {
        let mut config = PipelineConfig::default();
        config.detectors.ring_min_size = 1;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooSmall { field: "detectors.ring_min_size", min: 2, value: 1 })
        ));

        config.detectors.ring_min_size = 2;
        assert!(config.validate().is_ok());
    }
}
