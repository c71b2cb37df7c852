// 🚩 Red-Flag Engine - Typed, severity-scored findings with evidence
//
// A fixed battery of independent detectors. Each one reads the same immutable
// graph snapshot and returns its own flags; the engine fans them out in
// parallel and fans the results back in. Flags are statistical indicators,
// never conclusions.

pub mod audit;
pub mod bidding;
pub mod campaign;
pub mod circular;
pub mod collusion;
pub mod community;
pub mod concentration;
pub mod engine;
pub mod phoenix;
pub mod risk;
pub mod shell_company;
pub mod splitting;

pub use engine::{DetectionOutcome, RedFlagEngine};
pub use risk::{roll_up, EntityRiskReport};

use crate::config::DetectorConfig;
use crate::error::DetectorError;
use crate::graph::ResolvedGraph;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// FLAG VOCABULARY
// ============================================================================

/// Ordered so that `max()` picks the most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagType {
    SingleBidder,
    IdenticalBidAmounts,
    SplitContracts,
    Concentration,
    CollusionRing,
    PhoenixCompany,
    CircularSubcontracting,
    AuditRepeat,
    ShellCompany,
    CampaignConnection,
}

impl FlagType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagType::SingleBidder => "single_bidder",
            FlagType::IdenticalBidAmounts => "identical_bid_amounts",
            FlagType::SplitContracts => "split_contracts",
            FlagType::Concentration => "concentration",
            FlagType::CollusionRing => "collusion_ring",
            FlagType::PhoenixCompany => "phoenix_company",
            FlagType::CircularSubcontracting => "circular_subcontracting",
            FlagType::AuditRepeat => "audit_repeat",
            FlagType::ShellCompany => "shell_company",
            FlagType::CampaignConnection => "campaign_connection",
        }
    }
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a flag is attached to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "subject", rename_all = "snake_case")]
pub enum FlagSubject {
    Entity { id: String },
    Pair { left: String, right: String },
}

impl FlagSubject {
    pub fn entity(id: &str) -> Self {
        FlagSubject::Entity { id: id.to_string() }
    }

    pub fn pair(left: &str, right: &str) -> Self {
        FlagSubject::Pair {
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    /// Every entity the flag counts against
    pub fn entity_ids(&self) -> Vec<&str> {
        match self {
            FlagSubject::Entity { id } => vec![id.as_str()],
            FlagSubject::Pair { left, right } => vec![left.as_str(), right.as_str()],
        }
    }
}

// ============================================================================
// EVIDENCE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleHop {
    pub from: String,
    pub to: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    SingleBid {
        contract_ref: String,
        agency: String,
        amount: f64,
        contractor_single_bid_rate: f64,
    },
    SingleBidPattern {
        single_bid_contracts: Vec<String>,
        total_contracts: usize,
        rate: f64,
    },
    IdenticalBids {
        contract_ref: String,
        first_bidder: String,
        second_bidder: String,
        first_amount: f64,
        second_amount: f64,
        relative_difference: f64,
    },
    SplitContracts {
        agency: String,
        contract_refs: Vec<String>,
        amounts: Vec<f64>,
        total: f64,
        threshold: f64,
        first_award: NaiveDate,
        last_award: NaiveDate,
    },
    Concentration {
        hhi: f64,
        total_value: f64,
        contract_count: usize,
        top_contractor: Option<String>,
        top_share: Option<f64>,
    },
    CollusionRing {
        members: Vec<String>,
        density: f64,
        rotation: f64,
        shared_contracts: Vec<String>,
    },
    Phoenix {
        blacklisted: String,
        offense: String,
        via: Vec<String>,
    },
    CircularSubcontracting {
        prime_contractor: String,
        cycle: Vec<String>,
        hops: Vec<CycleHop>,
        net_retained: f64,
        prime_contract_value: f64,
    },
    AuditRepeat {
        finding_type: String,
        years: Vec<i32>,
        descriptions: Vec<String>,
    },
    ShellCompany {
        registered_capital: f64,
        total_awarded: f64,
        ratio: f64,
    },
    CampaignConnection {
        politician: String,
        donation_amount: f64,
        donation_date: NaiveDate,
        agencies: Vec<String>,
        contract_refs: Vec<String>,
        contracts_won: f64,
    },
}

// ============================================================================
// RED FLAG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedFlag {
    pub flag_type: FlagType,
    pub severity: Severity,
    pub subject: FlagSubject,
    pub description: String,
    pub evidence: Evidence,
    /// Serialized form of `evidence`, as stored
    pub evidence_json: String,
    pub detected_at: DateTime<Utc>,
}

// ============================================================================
// DETECTORS
// ============================================================================

/// Everything a detector may read. Shared by every detector in a run.
pub struct DetectionContext<'a> {
    pub graph: &'a ResolvedGraph,
    pub config: &'a DetectorConfig,
    pub detected_at: DateTime<Utc>,
}

impl<'a> DetectionContext<'a> {
    pub fn new(graph: &'a ResolvedGraph, config: &'a DetectorConfig, detected_at: DateTime<Utc>) -> Self {
        DetectionContext {
            graph,
            config,
            detected_at,
        }
    }

    /// Build a flag stamped with this run's detection time
    pub fn flag(
        &self,
        detector: &str,
        flag_type: FlagType,
        severity: Severity,
        subject: FlagSubject,
        description: String,
        evidence: Evidence,
    ) -> Result<RedFlag, DetectorError> {
        let evidence_json =
            serde_json::to_string(&evidence).map_err(|e| DetectorError::new(detector, e.to_string()))?;
        Ok(RedFlag {
            flag_type,
            severity,
            subject,
            description,
            evidence,
            evidence_json,
            detected_at: self.detected_at,
        })
    }
}

/// One independent check over the snapshot
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Vec<RedFlag>, DetectorError>;
}

/// "PHP 4,950,000.00"
pub(crate) fn peso(amount: f64) -> String {
    let whole = amount.abs().trunc() as u64;
    let cents = ((amount.abs().fract() * 100.0).round() as u64).min(99);
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("PHP {}{}.{:02}", sign, grouped, cents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert_eq!(
            [Severity::Medium, Severity::Critical, Severity::Low].iter().max(),
            Some(&Severity::Critical)
        );
    }

    #[test]
    fn test_peso_formatting() {
        assert_eq!(peso(4_950_000.0), "PHP 4,950,000.00");
        assert_eq!(peso(999.5), "PHP 999.50");
        assert_eq!(peso(0.0), "PHP 0.00");
    }

    #[test]
    fn test_evidence_serializes_with_kind_tag() {
        let evidence = Evidence::ShellCompany {
            registered_capital: 10_000.0,
            total_awarded: 5_000_000.0,
            ratio: 500.0,
        };
        let json = serde_json::to_value(&evidence).unwrap();
        assert_eq!(json["kind"], "shell_company");
        assert_eq!(json["ratio"], 500.0);
    }
}
